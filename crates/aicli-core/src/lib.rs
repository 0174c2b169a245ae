// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent core: the multi-turn tool loop, the worker pool it fans tool
//! calls out to, the continuation-state file, and the auto-search planner.

mod agent;
mod auto_search;
mod continue_state;
mod pool;

pub use agent::{run_with_tools, ToolLoopOutcome, ToolLoopRequest};
pub use auto_search::plan_search;
pub use continue_state::{
    parse_continue_opt, read_id, state_path, state_path_in, write_id, ContinueMode, ContinueOpt,
    ParseContinueError,
};
pub use pool::{PoolStopping, ThreadPool};
