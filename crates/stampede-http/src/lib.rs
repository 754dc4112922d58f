// Reqwest Transport for Stampede
//
// Production implementation of the core HttpTransport trait. Keeps the
// engine's contract: send() never fails, a request that obtained no response
// reports the status-0 sentinel with the elapsed time it spent trying.

mod transport;

pub use transport::ReqwestTransport;
