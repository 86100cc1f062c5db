// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-event and worker-result handlers.

mod batch_init;
mod member;
mod phase_due;
mod poll;
mod result;
mod retry;
