// Response classification
//
// classify() is a total, deterministic, side-effect-free function from a raw
// request outcome to an OutcomeCategory. The precedence order below is the
// contract; all metric recording happens in the caller.
//
// Precedence:
//   1. no response or 5xx        -> SystemError
//   2. 200 / 202                 -> Success
//   3. 409                       -> BizDuplicate
//   4. 400 + body keyword scan   -> BizSoldOut / BizInsufficientStock /
//                                   BizInsufficientBalance / BizUnknown
//   5. anything else             -> SystemError (unexpected codes are never
//                                   silently ignored)

use crate::outcome::{OutcomeCategory, RequestOutcome, STATUS_NO_RESPONSE};

// Keyword sets are matched case-insensitively as substrings. The Korean
// variants cover targets that respond with localized messages. Sold-out and
// stock keywords are checked before balance keywords so that a body like
// "insufficient stock" lands in the stock bucket.
const SOLD_OUT_KEYWORDS: [&str; 3] = ["sold out", "soldout", "품절"];
const STOCK_KEYWORDS: [&str; 2] = ["stock", "재고"];
const BALANCE_KEYWORDS: [&str; 3] = ["balance", "insufficient", "부족"];

/// Classify a raw request outcome
pub fn classify(outcome: &RequestOutcome) -> OutcomeCategory {
    let status = outcome.status;

    if status == STATUS_NO_RESPONSE || status >= 500 {
        return OutcomeCategory::SystemError;
    }

    match status {
        200 | 202 => OutcomeCategory::Success,
        409 => OutcomeCategory::BizDuplicate,
        400 => classify_rejection_body(outcome),
        _ => OutcomeCategory::SystemError,
    }
}

/// Keyword scan for a 400 body
///
/// Prefers the server's message field when the body is JSON, falling back to
/// the raw body text.
fn classify_rejection_body(outcome: &RequestOutcome) -> OutcomeCategory {
    let text = outcome
        .extract_field("message")
        .or_else(|| outcome.extract_field("error"))
        .unwrap_or_else(|| outcome.body.clone())
        .to_lowercase();

    if contains_any(&text, &SOLD_OUT_KEYWORDS) {
        OutcomeCategory::BizSoldOut
    } else if contains_any(&text, &STOCK_KEYWORDS) {
        OutcomeCategory::BizInsufficientStock
    } else if contains_any(&text, &BALANCE_KEYWORDS) {
        OutcomeCategory::BizInsufficientBalance
    } else {
        OutcomeCategory::BizUnknown
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}
