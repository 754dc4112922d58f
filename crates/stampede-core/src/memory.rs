// In-memory transports for examples and testing
//
// These implementations keep all state in memory, making them perfect for:
// - Engine tests that need deterministic target behavior
// - Standalone examples that don't need a real service
//
// MockInventoryTransport reproduces the contract of a finite-stock endpoint
// with duplicate suppression: 202 on first issue, 409 for a repeated
// identity, 400 with a sold-out body once stock is exhausted.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::outcome::RequestOutcome;
use crate::transport::{HttpTransport, RequestSpec};

// ============================================================================
// StaticTransport - Always returns the same response
// ============================================================================

/// Transport that answers every request with a fixed status and body
///
/// An optional delay simulates server latency; the reported latency is
/// measured around it, as a real transport would.
#[derive(Debug, Clone)]
pub struct StaticTransport {
    status: u16,
    body: String,
    delay: Option<Duration>,
}

impl StaticTransport {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl HttpTransport for StaticTransport {
    async fn send(&self, _request: RequestSpec) -> RequestOutcome {
        let start = Instant::now();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        RequestOutcome::new(self.status, self.body.clone(), start.elapsed())
    }
}

// ============================================================================
// MockInventoryTransport - Finite stock with duplicate suppression
// ============================================================================

#[derive(Debug)]
struct Inventory {
    stock: u64,
    issued: HashSet<String>,
}

/// Transport simulating a first-come-first-served issue endpoint
///
/// The requesting identity is read from the JSON body's `userId` field.
/// Check-and-issue is atomic under one mutex, so concurrent VUs observe the
/// same duplicate/sold-out semantics a correctly locked target would give.
#[derive(Debug)]
pub struct MockInventoryTransport {
    inventory: Mutex<Inventory>,
    delay: Option<Duration>,
}

impl MockInventoryTransport {
    pub fn new(stock: u64) -> Self {
        Self {
            inventory: Mutex::new(Inventory {
                stock,
                issued: HashSet::new(),
            }),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Units not yet issued
    pub fn remaining_stock(&self) -> u64 {
        self.inventory.lock().unwrap().stock
    }

    /// Distinct identities that have been issued a unit
    pub fn issued_count(&self) -> usize {
        self.inventory.lock().unwrap().issued.len()
    }

    fn respond(&self, request: &RequestSpec) -> (u16, String) {
        let user_id = request
            .body
            .as_deref()
            .and_then(|body| serde_json::from_str::<serde_json::Value>(body).ok())
            .and_then(|v| v.get("userId").and_then(|u| u.as_str()).map(str::to_owned));

        let Some(user_id) = user_id else {
            return (400, r#"{"message":"validation failed: userId"}"#.to_string());
        };

        let mut inventory = self.inventory.lock().unwrap();
        if inventory.issued.contains(&user_id) {
            return (
                409,
                r#"{"code":"C006","message":"coupon already issued"}"#.to_string(),
            );
        }
        if inventory.stock == 0 {
            return (
                400,
                r#"{"code":"C001","message":"coupon sold out"}"#.to_string(),
            );
        }
        inventory.stock -= 1;
        inventory.issued.insert(user_id);
        (202, r#"{"status":"accepted"}"#.to_string())
    }
}

#[async_trait]
impl HttpTransport for MockInventoryTransport {
    async fn send(&self, request: RequestSpec) -> RequestOutcome {
        let start = Instant::now();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let (status, body) = self.respond(&request);
        RequestOutcome::new(status, body, start.elapsed())
    }
}
