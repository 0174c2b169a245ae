// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli_help;
mod execute;
mod list_files;
mod web_fetch;
mod web_search;

pub use cli_help::CliHelpTool;
pub use execute::ExecuteTool;
pub use list_files::ListAllowedFilesTool;
pub use web_fetch::{parse_prefix_list, WebFetchTool};
pub use web_search::WebSearchTool;
