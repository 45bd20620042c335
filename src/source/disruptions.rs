use serde::Deserialize;
use tracing::debug;

use super::{ApiConfig, TrainRef};
use crate::error::FetchError;
use crate::fetch::{HttpClient, get_json};

/// Body of `/disruptions/shortened`.
#[derive(Debug, Clone, Deserialize)]
pub struct Disruptions {
    pub ts: String,
    #[serde(default)]
    pub ds: Vec<Disruption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Disruption {
    pub id: i64,
    #[serde(default)]
    pub tt: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    /// Affected runs.
    #[serde(default)]
    pub ar: Vec<TrainRef>,
}

pub async fn fetch_disruptions<C: HttpClient>(
    client: &C,
    api: &ApiConfig,
) -> Result<Disruptions, FetchError> {
    debug!("Fetching disruptions");
    get_json(client, api.endpoint(&["disruptions", "shortened"])).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockClient;

    #[tokio::test]
    async fn test_fetch_disruptions() {
        let client = MockClient::new();
        client.push_json(
            200,
            r#"{
                "ts": "2026-01-05T10:00:00+01:00",
                "ds": [
                    {"id": 9, "tc": "X", "tt": "Track works", "msg": null,
                     "ar": [{"sid": 1, "oid": 2, "od": "2026-01-05", "seq": 3}]},
                    {"id": 10, "ar": []}
                ]
            }"#,
        );

        let d = fetch_disruptions(&client, &ApiConfig::default()).await.unwrap();
        assert_eq!(d.ds.len(), 2);
        assert_eq!(d.ds[0].tt.as_deref(), Some("Track works"));
        assert_eq!(d.ds[0].msg, None);
        assert_eq!(d.ds[0].ar[0].od, "2026-01-05");
        assert!(d.ds[1].ar.is_empty());
        assert_eq!(
            client.requests()[0].url.as_str(),
            "https://pdp-api.plk-sa.pl/api/v1/disruptions/shortened"
        );
    }
}
