//! Moonraker JSON envelopes.
//!
//! Object queries answer `{"result": {"eventtime": .., "status": {<object>: {..}}}}`.
//! Only the fields the host reads are modelled; everything else is ignored.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct QueryEnvelope<T> {
    pub result: QueryResult<T>,
}

#[derive(Debug, Deserialize)]
pub struct QueryResult<T> {
    pub status: T,
}

#[derive(Debug, Deserialize)]
pub struct WebhooksStatus {
    pub webhooks: Webhooks,
}

#[derive(Debug, Deserialize)]
pub struct Webhooks {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrintStatsStatus {
    pub print_stats: PrintStats,
}

#[derive(Debug, Default, Deserialize)]
pub struct PrintStats {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub info: Option<PrintStatsInfo>,
}

/// Populated by `SET_PRINT_STATS_INFO`; slicers that skip it leave both null.
#[derive(Debug, Default, Deserialize)]
pub struct PrintStatsInfo {
    #[serde(default)]
    pub current_layer: Option<u32>,
    #[serde(default)]
    pub total_layer: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_stats_envelope() {
        let body = r#"{"result":{"eventtime":12.5,"status":{"print_stats":{
            "filename":"cube_0.2mm.gcode","state":"printing",
            "info":{"current_layer":4,"total_layer":null}}}}}"#;
        let env: QueryEnvelope<PrintStatsStatus> = serde_json::from_str(body).unwrap();
        let stats = env.result.status.print_stats;
        assert_eq!(stats.state.as_deref(), Some("printing"));
        assert_eq!(stats.filename.as_deref(), Some("cube_0.2mm.gcode"));
        let info = stats.info.unwrap();
        assert_eq!(info.current_layer, Some(4));
        assert_eq!(info.total_layer, None);
    }

    #[test]
    fn test_missing_info_is_tolerated() {
        let body = r#"{"result":{"status":{"print_stats":{"state":"standby"}}}}"#;
        let env: QueryEnvelope<PrintStatsStatus> = serde_json::from_str(body).unwrap();
        assert!(env.result.status.print_stats.info.is_none());
    }
}
