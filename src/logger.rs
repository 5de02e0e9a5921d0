// Copyright 2024-2025 Tree xie.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{Error, Result};
use tracing::error;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::EnvFilter;

static LOG_TARGET: &str = "s3acme::logger";

pub struct LoggerParams {
    /// Level or comma separated directives
    pub level: String,
    pub json: bool,
}

pub fn new_env_filter(level: &str) -> EnvFilter {
    let mut initial_filter = EnvFilter::from_default_env();
    for item in level.split(',').filter(|item| !item.trim().is_empty()) {
        match item.trim().parse::<Directive>() {
            Ok(directive) => {
                initial_filter = initial_filter.add_directive(directive);
            },
            Err(e) => {
                error!(
                    target: LOG_TARGET,
                    error = e.to_string(),
                    "parse directive fail"
                );
            },
        };
    }
    initial_filter
}

/// Initializes the global logger writing to stderr,
/// it should be called before the runtime starts.
pub fn logger_try_init(params: LoggerParams) -> Result<()> {
    let offset = time::UtcOffset::current_local_offset()
        .unwrap_or(time::UtcOffset::UTC);
    let timer =
        OffsetTime::new(offset, time::format_description::well_known::Rfc3339);
    let is_dev = cfg!(debug_assertions);

    let result = if params.json {
        tracing_subscriber::fmt()
            .event_format(tracing_subscriber::fmt::format::json())
            .with_env_filter(new_env_filter(&params.level))
            .with_ansi(false)
            .with_timer(timer)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(new_env_filter(&params.level))
            .with_ansi(is_dev)
            .with_timer(timer)
            .with_target(is_dev)
            .with_writer(std::io::stderr)
            .try_init()
    };
    result.map_err(|e| Error::Logger {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::new_env_filter;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_env_filter() {
        let filter = new_env_filter("info,s3acme::acme=debug");
        let value = filter.to_string();
        assert!(value.contains("s3acme::acme=debug"));
        assert!(value.contains("info"));

        // invalid directives are skipped
        let filter = new_env_filter("warn,s3acme::cache=verbose");
        assert_eq!(false, filter.to_string().contains("s3acme::cache"));
    }
}
