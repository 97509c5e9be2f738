//! Orchestration scenario tests.
//!
//! - `harness.rs`      - Scripted SDK, scripted exchange transport, completion recorder
//! - `orchestrator.rs` - I. Construction and happy path (Rules 1-8)
//!                     - II. Native outcomes and grant policy (Rules 9-14)
//! - `cancellation.rs` - III. Cancellation and stale events (Rules 15-19)
//!                     - IV. Callback timeout (Rules 20-22)
//! - `exchange.rs`     - V. Token exchange retry and mapping (Rules 23-31)
//! - `lifecycle.rs`    - VI. Lifecycle routing and registry (Rules 32-38)

mod orchestrator;
