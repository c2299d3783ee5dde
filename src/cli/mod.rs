// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! CLI command implementations

pub mod dns;
pub mod serve;
