// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the persisted entities.

pub mod mutations;
pub mod snapshots;
