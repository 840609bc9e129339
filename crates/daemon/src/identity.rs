// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identity synthesis.

use uuid::Uuid;

/// `{hostname}-{8 hex}` where the hex is the low 32 bits of a random UUID.
///
/// Synthesized once at startup when no id is configured, then persisted
/// alongside the config so it survives restarts.
pub fn synthesize_agent_id() -> String {
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    let low32 = (Uuid::new_v4().as_u128() & 0xffff_ffff) as u32;
    format!("{hostname}-{low32:08x}")
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
