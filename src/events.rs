//! Standard simulation events.

// AGGREGATOR EVENTS //
pub mod aggregator {
    use serde::Serialize;

    /// Debounce timer of the widget load aggregator.
    #[derive(Clone, Serialize)]
    pub struct FlushWidgetRequests {
    }
}

// WIDGET LIFECYCLE EVENTS //
pub mod widget {
    use serde::Serialize;

    #[derive(Clone, Serialize)]
    pub struct WidgetRender {
    }

    #[derive(Clone, Serialize)]
    pub struct WidgetRefresh {
    }

    #[derive(Clone, Serialize)]
    pub struct WidgetDestroy {
    }
}

// API SERVER INTERACTION EVENTS //
pub mod api_server {
    use serde::Serialize;
    use crate::api_server::MetricsQuery;
    use crate::errors::ApiError;
    use crate::host::HostComponentState;

    #[derive(Clone, Serialize)]
    pub struct MetricsRequest {
        pub query: MetricsQuery,
        pub reply_to: u32,
    }

    #[derive(Clone, Serialize)]
    pub struct MetricsResponse {
        pub request_id: u64,
        pub result: Result<serde_json::Value, ApiError>,
    }

    #[derive(Clone, Serialize)]
    pub struct HostComponentStateChanged {
        pub host_name: String,
        pub component_name: String,
        pub state: HostComponentState,
    }
}

pub mod logger {
    use serde::Serialize;

    #[derive(Clone, Serialize)]
    pub struct MetricsSnapshot {
    }
}
