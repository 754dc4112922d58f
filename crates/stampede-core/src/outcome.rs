// Request outcomes and the outcome taxonomy
//
// A RequestOutcome is the raw result of one request as produced by the
// transport. An OutcomeCategory is its classified form: success, an expected
// business rejection, or a system failure. Categories are assigned once by
// `classify` and never re-derived.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sentinel status for requests that produced no response at all
/// (connection refused, timeout, DNS failure)
pub const STATUS_NO_RESPONSE: u16 = 0;

/// Raw result of a single request
///
/// Produced by the transport, consumed once by the classifier. The body is
/// opaque to everything except the classifier's extraction helpers.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// HTTP status code, or 0 if no response was received
    pub status: u16,
    /// Response body (may be empty)
    pub body: String,
    /// Time from request start to last body byte
    pub latency: Duration,
}

impl RequestOutcome {
    /// Create an outcome for a request that received a response
    pub fn new(status: u16, body: impl Into<String>, latency: Duration) -> Self {
        Self {
            status,
            body: body.into(),
            latency,
        }
    }

    /// Create an outcome for a request that received no response
    pub fn no_response(latency: Duration) -> Self {
        Self {
            status: STATUS_NO_RESPONSE,
            body: String::new(),
            latency,
        }
    }

    /// Extract a top-level string field from a JSON body
    ///
    /// Returns None if the body is not JSON, the field is missing, or the
    /// field is not a string. Used by the classifier to scan the server's
    /// message field; callers should treat the body as opaque.
    pub fn extract_field(&self, name: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        value.get(name)?.as_str().map(str::to_owned)
    }
}

/// Classified result of a request
///
/// Business rejections (duplicate suppression, sold-out, insufficient funds
/// or stock) are expected outcomes of a correctly behaving target, not
/// errors. Only SystemError indicates a failure of the system under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    /// 200/202 - the operation was accepted
    Success,
    /// 409 - the target correctly refused a repeated identity
    BizDuplicate,
    /// 400 with a sold-out body - the finite resource ran out
    BizSoldOut,
    /// 400 with a balance body - the actor lacked funds
    BizInsufficientBalance,
    /// 400 with a stock body - the item lacked inventory
    BizInsufficientStock,
    /// 400 with no recognized keyword
    BizUnknown,
    /// No response, 5xx, or an unexpected status
    SystemError,
}

impl OutcomeCategory {
    /// All categories, in reporting order
    pub const ALL: [OutcomeCategory; 7] = [
        OutcomeCategory::Success,
        OutcomeCategory::BizDuplicate,
        OutcomeCategory::BizSoldOut,
        OutcomeCategory::BizInsufficientBalance,
        OutcomeCategory::BizInsufficientStock,
        OutcomeCategory::BizUnknown,
        OutcomeCategory::SystemError,
    ];

    /// Sink name for this category's counter
    pub fn metric_name(&self) -> &'static str {
        match self {
            OutcomeCategory::Success => "success",
            OutcomeCategory::BizDuplicate => "biz_duplicate",
            OutcomeCategory::BizSoldOut => "biz_soldout",
            OutcomeCategory::BizInsufficientBalance => "biz_insufficient_balance",
            OutcomeCategory::BizInsufficientStock => "biz_insufficient_stock",
            OutcomeCategory::BizUnknown => "biz_unknown",
            OutcomeCategory::SystemError => "system_error",
        }
    }

    /// Sink name for this category's latency trend
    pub fn latency_metric_name(&self) -> &'static str {
        match self {
            OutcomeCategory::Success => "latency_success",
            OutcomeCategory::BizDuplicate => "latency_biz_duplicate",
            OutcomeCategory::BizSoldOut => "latency_biz_soldout",
            OutcomeCategory::BizInsufficientBalance => "latency_biz_insufficient_balance",
            OutcomeCategory::BizInsufficientStock => "latency_biz_insufficient_stock",
            OutcomeCategory::BizUnknown => "latency_biz_unknown",
            OutcomeCategory::SystemError => "latency_system_error",
        }
    }

    /// Whether this category is an expected business rejection
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            OutcomeCategory::BizDuplicate
                | OutcomeCategory::BizSoldOut
                | OutcomeCategory::BizInsufficientBalance
                | OutcomeCategory::BizInsufficientStock
                | OutcomeCategory::BizUnknown
        )
    }
}

impl std::fmt::Display for OutcomeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.metric_name())
    }
}
