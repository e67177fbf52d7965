/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the date-spec parser behind every `--since` style
//! input. Accepted forms, tried in exactly this order:
//!
//! 1. named days: `today`, `yesterday`, `tomorrow` (midnight of the local day)
//! 2. ISO-8601 date: `2024-06-01`
//! 3. ISO-8601 date-time, with optional `Z` or offset
//! 4. day counts: `7d` (now minus N whole days, N >= 0)
//! 5. durations: `24h`, `2h30m`
//! 6. natural language: `last week`, `3 days ago`, `last month`, `1 hour ago`
//!
//! `-1d`, `3.5d`, the empty string, and anything else fail.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DAY_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)d$").expect("static regex"));

static DURATION: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?$").expect("static regex"));

static RELATIVE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^(\d+)\s+(minute|hour|day|week|month|year)s?\s+ago$").expect("static regex")
});

/// A date spec that doesn't parse under any accepted form
#[derive(thiserror::Error, Debug)]
#[error("can't parse date spec {0:?}")]
pub struct DateSpecError(pub String);

/// Parses `spec` relative to the current local time
///
/// # Errors
/// if `spec` fits none of the accepted forms
pub fn parse(spec: &str) -> Result<DateTime<Utc>, DateSpecError> {
	parse_at(spec, Local::now())
}

fn parse_at(spec: &str, now: DateTime<Local>) -> Result<DateTime<Utc>, DateSpecError> {
	let spec = spec.trim();
	if spec.is_empty() {
		return Err(DateSpecError(spec.to_owned()));
	}

	let lower = spec.to_lowercase();

	// 1. named days
	match lower.as_str() {
		"today" => return local_midnight(now.date_naive(), spec),
		"yesterday" => return local_midnight(now.date_naive() - Duration::days(1), spec),
		"tomorrow" => return local_midnight(now.date_naive() + Duration::days(1), spec),
		_ => {}
	}

	// 2. ISO date
	if let Ok(date) = NaiveDate::parse_from_str(spec, "%Y-%m-%d") {
		return local_midnight(date, spec);
	}

	// 3. ISO date-time, offset-carrying or naive-local
	if let Ok(dt) = DateTime::parse_from_rfc3339(spec) {
		return Ok(dt.with_timezone(&Utc));
	}
	if let Ok(naive) = NaiveDateTime::parse_from_str(spec, "%Y-%m-%dT%H:%M:%S") {
		return Local
			.from_local_datetime(&naive)
			.earliest()
			.map(|dt| dt.with_timezone(&Utc))
			.ok_or_else(|| DateSpecError(spec.to_owned()));
	}

	// 4. day counts
	if let Some(caps) = DAY_COUNT.captures(&lower) {
		let days: i64 = caps[1]
			.parse()
			.map_err(|_| DateSpecError(spec.to_owned()))?;

		return Ok((now - Duration::hours(days * 24)).with_timezone(&Utc));
	}

	// 5. durations
	if let Some(caps) = DURATION.captures(&lower) {
		if caps.get(1).is_some() || caps.get(2).is_some() {
			let hours: i64 = caps
				.get(1)
				.map_or(Ok(0), |m| m.as_str().parse())
				.map_err(|_| DateSpecError(spec.to_owned()))?;
			let minutes: i64 = caps
				.get(2)
				.map_or(Ok(0), |m| m.as_str().parse())
				.map_err(|_| DateSpecError(spec.to_owned()))?;

			return Ok(
				(now - Duration::hours(hours) - Duration::minutes(minutes)).with_timezone(&Utc),
			);
		}
	}

	// 6. natural language
	match lower.as_str() {
		"last week" => return Ok((now - Duration::days(7)).with_timezone(&Utc)),
		"last month" => return Ok((now - Duration::days(30)).with_timezone(&Utc)),
		"last year" => return Ok((now - Duration::days(365)).with_timezone(&Utc)),
		_ => {}
	}

	if let Some(caps) = RELATIVE.captures(&lower) {
		let count: i64 = caps[1]
			.parse()
			.map_err(|_| DateSpecError(spec.to_owned()))?;

		let unit = match &caps[2] {
			"minute" => Duration::minutes(1),
			"hour" => Duration::hours(1),
			"day" => Duration::days(1),
			"week" => Duration::days(7),
			"month" => Duration::days(30),
			"year" => Duration::days(365),
			_ => return Err(DateSpecError(spec.to_owned())),
		};

		return Ok((now - unit * count as i32).with_timezone(&Utc));
	}

	Err(DateSpecError(spec.to_owned()))
}

fn local_midnight(date: NaiveDate, spec: &str) -> Result<DateTime<Utc>, DateSpecError> {
	let naive = date
		.and_hms_opt(0, 0, 0)
		.ok_or_else(|| DateSpecError(spec.to_owned()))?;

	Local
		.from_local_datetime(&naive)
		.earliest()
		.map(|dt| dt.with_timezone(&Utc))
		.ok_or_else(|| DateSpecError(spec.to_owned()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn now() -> DateTime<Local> {
		Local::now()
	}

	fn close_to(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
		(a - b).num_seconds().abs() <= 1
	}

	#[test]
	fn today_is_local_midnight() {
		let parsed = parse("today").expect("should parse");
		let local = parsed.with_timezone(&Local);

		assert_eq!(local.date_naive(), now().date_naive());
		assert_eq!(local.time(), chrono::NaiveTime::MIN);
	}

	#[test]
	fn yesterday_and_tomorrow_are_adjacent_days() {
		let today = parse("today").expect("parse");
		let yesterday = parse("yesterday").expect("parse");
		let tomorrow = parse("tomorrow").expect("parse");

		assert!(close_to(today - Duration::days(1), yesterday));
		assert!(close_to(today + Duration::days(1), tomorrow));
	}

	#[test]
	fn day_count_is_whole_days_back() {
		let parsed = parse("7d").expect("should parse");
		let expected = Utc::now() - Duration::hours(168);

		assert!(close_to(parsed, expected));
	}

	#[test]
	fn zero_days_is_now() {
		let parsed = parse("0d").expect("should parse");
		assert!(close_to(parsed, Utc::now()));
	}

	#[test]
	fn iso_date_parses_to_midnight() {
		let parsed = parse("2024-06-01").expect("should parse");
		let local = parsed.with_timezone(&Local);

		assert_eq!(
			local.date_naive(),
			NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
		);
		assert_eq!(local.time(), chrono::NaiveTime::MIN);
	}

	#[test]
	fn iso_datetime_with_offset_parses() {
		let parsed = parse("2024-06-01T12:30:00Z").expect("should parse");
		assert_eq!(parsed.to_rfc3339(), "2024-06-01T12:30:00+00:00");

		let offset = parse("2024-06-01T12:30:00+02:00").expect("should parse");
		assert_eq!(offset.to_rfc3339(), "2024-06-01T10:30:00+00:00");
	}

	#[test]
	fn durations_parse() {
		assert!(close_to(
			parse("24h").expect("parse"),
			Utc::now() - Duration::hours(24)
		));
		assert!(close_to(
			parse("2h30m").expect("parse"),
			Utc::now() - Duration::minutes(150)
		));
		assert!(close_to(
			parse("45m").expect("parse"),
			Utc::now() - Duration::minutes(45)
		));
	}

	#[test]
	fn natural_language_fallback_parses() {
		assert!(close_to(
			parse("last week").expect("parse"),
			Utc::now() - Duration::days(7)
		));
		assert!(close_to(
			parse("3 days ago").expect("parse"),
			Utc::now() - Duration::days(3)
		));
		assert!(close_to(
			parse("last month").expect("parse"),
			Utc::now() - Duration::days(30)
		));
		assert!(close_to(
			parse("1 hour ago").expect("parse"),
			Utc::now() - Duration::hours(1)
		));
	}

	#[test]
	fn invalid_specs_fail() {
		for bad in ["-1d", "3.5d", "", "invalid", "dd", "h", "ago", "5 parsecs ago"] {
			assert!(parse(bad).is_err(), "{bad:?} must not parse");
		}
	}

	#[test]
	fn day_count_beats_nothing_else() {
		// "1d" goes through the day-count branch, not the duration one
		let parsed = parse_at("1d", now()).expect("parse");
		assert!(close_to(parsed, Utc::now() - Duration::hours(24)));
	}
}
