/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Process-level setup for the `gather` binary: logging via `tracing` with
//! the filter taken from the `GATHER_LOG` environment variable

pub fn init() {
	set_up_logging();
}

pub fn set_up_logging() {
	use tracing::Level;
	use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

	let env_filter =
		EnvFilter::try_from_env("GATHER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

	let is_debug_log_level = env_filter
		.max_level_hint()
		.map_or_else(|| false, |level| level >= Level::DEBUG);

	let stdout = tracing_subscriber::fmt::layer()
		.with_target(is_debug_log_level)
		.with_file(is_debug_log_level)
		.with_line_number(is_debug_log_level)
		.with_thread_ids(is_debug_log_level);

	let stdout = if is_debug_log_level {
		stdout.pretty().boxed()
	} else {
		stdout.boxed()
	};

	let subscriber = tracing_subscriber::registry().with(stdout.with_filter(env_filter));

	tracing::subscriber::set_global_default(subscriber)
		.expect("tracing shouldn't already have been set up");
}
