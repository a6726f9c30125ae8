// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for sqlsage
//!
//! The reasoning step talks to a model only through [`LlmProvider`]; the
//! concrete OpenAI-compatible client lives under [`providers`].

pub mod factory;
pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod retry;

pub use factory::ProviderFactory;
pub use message::*;
pub use provider::*;
