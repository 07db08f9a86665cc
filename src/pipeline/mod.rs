//! Asynchronous generation pipeline.
//!
//! ```text
//! submit ──► store (processing) ──► tokio::spawn ──┐
//!                                                  ▼
//!        lease client ─► upstream call ─► normalize ─► repair ─► conform
//!                                                  │
//!                          completed ◄── ok ───────┤
//!                          failed + refund ◄─ err ─┘
//! ```

mod manager;

pub use manager::JobManager;
