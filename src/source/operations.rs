use serde::Deserialize;
use tracing::debug;

use super::{ApiConfig, TrainRef};
use crate::error::FetchError;
use crate::fetch::{HttpClient, get_json};

/// One page of `/operations/shortened`.
#[derive(Debug, Clone, Deserialize)]
pub struct Operations {
    pub ts: String,
    #[serde(default)]
    pub tr: Vec<OperationTrain>,
    #[serde(default)]
    pub pg: Pagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    /// Has next page.
    #[serde(default)]
    pub hn: bool,
}

/// Status of a train the operator has called off.
pub const CANCELLED_STATUS: &str = "X";

#[derive(Debug, Clone, Deserialize)]
pub struct OperationTrain {
    #[serde(flatten)]
    pub train: TrainRef,
    /// Train status.
    #[serde(default)]
    pub s: Option<String>,
    #[serde(default)]
    pub st: Vec<OperationStop>,
}

impl OperationTrain {
    /// True when the run is called off as a whole: every reported stop is
    /// cancelled, or no stops are reported and the status is
    /// [`CANCELLED_STATUS`].
    pub fn entirely_cancelled(&self) -> bool {
        if self.st.is_empty() {
            return self.s.as_deref() == Some(CANCELLED_STATUS);
        }
        self.st.iter().all(OperationStop::cancelled)
    }
}

/// Live state of a train at one planned stop.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStop {
    /// Planned order number.
    pub psn: u32,
    /// Station id.
    pub id: i64,
    #[serde(default)]
    pub cn: Option<bool>,
    #[serde(default)]
    pub cf: Option<bool>,
    #[serde(default)]
    pub aa: Option<String>,
    #[serde(default)]
    pub ad: Option<String>,
}

impl OperationStop {
    pub fn cancelled(&self) -> bool {
        self.cn.unwrap_or(false)
    }

    pub fn confirmed(&self) -> bool {
        self.cf.unwrap_or(false)
    }
}

pub async fn fetch_operations_page<C: HttpClient>(
    client: &C,
    api: &ApiConfig,
    page: u32,
    page_size: u32,
) -> Result<Operations, FetchError> {
    let mut url = api.endpoint(&["operations", "shortened"]);
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string())
            .append_pair("fullRoutes", "true");
        for carrier in &api.exclude_carriers {
            query.append_pair("carriersExclude", carrier);
        }
    }

    debug!(page, page_size, "Fetching operations");
    get_json(client, url).await
}
