// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! LLM provider plumbing: provider selection, the OpenAI-shaped chat client,
//! and the dual-bucket rate limiter shared by embedding and chat calls.

pub mod chat;
pub mod provider;
pub mod rate_limiter;

pub use chat::{ChatClient, ChatCompletion, ChatMessage, ChatRequest};
pub use provider::{LlmClientFactory, LlmProvider, ResolvedProvider};
pub use rate_limiter::{RateLimitConfig, RateLimiter, RatePermit, WaitObserver};
