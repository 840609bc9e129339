// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level end-to-end scenario specs.
//!
//! Each module exercises one slice of the pipeline through public crate
//! APIs: collectors into the hot buffer, queue retry semantics, wire
//! delivery against a scripted endpoint, and governor throttling.

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/collectors.rs"]
mod collectors;
#[path = "specs/delivery.rs"]
mod delivery;
#[path = "specs/governor.rs"]
mod governor;
#[path = "specs/queue.rs"]
mod queue;
