// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

pub mod cancel;
pub mod chat;
pub mod config;
pub mod message;
pub mod session;
pub mod store;
pub mod stream;
pub mod transport;
