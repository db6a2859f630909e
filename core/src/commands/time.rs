//! The `time` command: timed, repeated evaluation of a script
//!
//! The loop stops at the requested count, after the first completion other
//! than `Ok` or `Continue`, or once the optional timeout has elapsed. A
//! `Continue` does not consume an iteration. Whatever the outcome, the
//! cleanup options reset interrupt flags, drop queued events and discard a
//! pending exit, each one independently.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use super::options::{parse_int, parse_options, OptionSpec};
use super::wrong_args;
use crate::cancel::CancelScope;
use crate::interpreter::script::format_list;
use crate::interpreter::Interpreter;
use crate::scopes::timeout_from_millis;
use crate::types::{code_of, Control, EvalResult, ReturnCode};

/// Iteration count meaning "until stopped"
pub const FOREVER: i64 = -1;

const USAGE: &str = "time script ?count? ?options?";

/// Raw counts are nanoseconds
const COUNTS_PER_SECOND: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeOptions {
    pub timeout: Option<Duration>,
    pub statistics: bool,
    /// Treat a cancelled or halted evaluation like `break`
    pub break_ok: bool,
    /// Treat an error as success and report the timing anyway
    pub error_ok: bool,
    pub no_cancel: bool,
    /// With `no_cancel`/`no_halt`, also reset the global flags
    pub global_cancel: bool,
    pub no_halt: bool,
    pub no_event: bool,
    pub no_exit: bool,
}

/* ===================== Report ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct TimingReport {
    pub requested: i64,
    pub actual: i64,
    /// Iterations the average is computed over
    pub result_iterations: i64,
    pub code: ReturnCode,
    /// Error message when the last iteration failed
    pub error: Option<String>,
    pub start_count: u64,
    pub stop_count: u64,
    /// Microseconds per iteration
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub statistics: bool,
    /// Counts are hidden and times truncated to whole milliseconds
    pub obfuscated: bool,
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.statistics {
            return write!(f, "{} microseconds per iteration", format_micros(self.average));
        }

        let mut items = Vec::new();
        if !self.obfuscated {
            items.push(format!("{} requested iterations", self.requested));
            items.push(format!("{} actual iterations", self.actual));
            items.push(format!("{} result iterations", self.result_iterations));
        }
        items.push(format!("code {}", self.code));
        if let Some(error) = &self.error {
            items.push(format_list(&["result", error.as_str()]));
        }
        if !self.obfuscated {
            items.push(format!("{} raw start count", self.start_count));
            items.push(format!("{} raw stop count", self.stop_count));
            items.push(format!("{} count per second", COUNTS_PER_SECOND));
        }
        items.push(format!("{} average microseconds per iteration", format_micros(self.average)));
        items.push(format!("{} minimum microseconds per iteration", format_micros(self.minimum)));
        items.push(format!("{} maximum microseconds per iteration", format_micros(self.maximum)));
        f.write_str(&format_list(&items))
    }
}

/// Up to four decimals without trailing zeros
fn format_micros(micros: f64) -> String {
    let text = format!("{:.4}", micros);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn obfuscate(micros: f64) -> f64 {
    (micros / 1000.0).trunc() * 1000.0
}

fn micros(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000_000.0
}

/* ===================== Harness ===================== */

/// Runs the cleanup options when the harness returns, whatever the outcome
struct HarnessCleanup<'a> {
    interp: &'a Interpreter,
    options: TimeOptions,
}

impl Drop for HarnessCleanup<'_> {
    fn drop(&mut self) {
        let options = self.options;
        if options.no_cancel {
            self.interp.reset_cancel(CancelScope::Local);
            if options.global_cancel {
                self.interp.reset_cancel(CancelScope::Global);
            }
        }
        if options.no_halt {
            self.interp.reset_halt(CancelScope::Local);
            if options.global_cancel {
                self.interp.reset_halt(CancelScope::Global);
            }
        }
        if options.no_event {
            let cleared = self.interp.clear_events();
            debug!(cleared, "time cleared pending events");
        }
        if options.no_exit {
            if let Some(code) = self.interp.signals().suppress_exit() {
                debug!(code, "time suppressed pending exit");
            }
        }
    }
}

impl Interpreter {
    /// Evaluate `script` up to `requested` times ([`FOREVER`] for no limit)
    ///
    /// A completion that is not accepted as success by `options` is returned
    /// as the error, after the cleanup options have run.
    pub fn time_script(&self, script: &str, requested: i64, options: TimeOptions) -> Result<TimingReport, Control> {
        let _cleanup = HarnessCleanup { interp: self, options };

        let mut remaining = if requested < FOREVER { 1 } else { requested };
        let mut actual: i64 = 0;
        let mut minimum: Option<Duration> = None;
        let mut maximum: Option<Duration> = None;
        let mut result: EvalResult = Ok(String::new());

        let start = Instant::now();
        loop {
            if remaining == 0 {
                break;
            }

            let iteration = Instant::now();
            result = self.eval(script);
            if options.statistics {
                let elapsed = iteration.elapsed();
                minimum = Some(minimum.map_or(elapsed, |m| m.min(elapsed)));
                maximum = Some(maximum.map_or(elapsed, |m| m.max(elapsed)));
            }
            actual += 1;

            if options.timeout.is_some_and(|timeout| start.elapsed() >= timeout) {
                break;
            }
            match code_of(&result) {
                ReturnCode::Continue => continue,
                ReturnCode::Ok => {}
                _ => break,
            }
            if remaining == FOREVER {
                continue;
            }
            remaining -= 1;
            if remaining <= 0 {
                break;
            }
        }
        let stop = Instant::now();

        let interrupted = matches!(&result, Err(Control::Error(err)) if err.is_interrupt());
        let code = if interrupted && options.break_ok {
            ReturnCode::Break
        } else {
            code_of(&result)
        };
        debug!(requested, actual, %code, "time finished");

        let success = match code {
            ReturnCode::Ok | ReturnCode::Break | ReturnCode::Continue => true,
            ReturnCode::Error => options.error_ok,
            ReturnCode::Exit => options.no_exit,
            ReturnCode::Return => false,
        };
        let error = match &result {
            Err(control @ Control::Error(_)) if code == ReturnCode::Error => Some(control.value()),
            _ => None,
        };
        if !success {
            if let Err(control) = result {
                if matches!(control, Control::Error(_)) {
                    self.add_error_info(&format!("\n    (\"time\" body line {})", self.error_line()));
                }
                return Err(control);
            }
        }
        if code == ReturnCode::Error {
            self.reset_cancel(CancelScope::Local);
            self.reset_error_info();
        }
        Ok(self.build_report(requested, actual, code, error, start, stop, (minimum, maximum), options))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_report(
        &self,
        requested: i64,
        actual: i64,
        code: ReturnCode,
        error: Option<String>,
        start: Instant,
        stop: Instant,
        (minimum, maximum): (Option<Duration>, Option<Duration>),
        options: TimeOptions,
    ) -> TimingReport {
        let result_iterations = if requested < FOREVER {
            requested.saturating_neg()
        } else if requested == FOREVER {
            actual
        } else if requested == 0 {
            1
        } else {
            match code {
                ReturnCode::Ok => requested,
                ReturnCode::Break if options.break_ok => requested,
                _ => actual,
            }
        };

        let elapsed = micros(stop.duration_since(start));
        let average = if result_iterations == 0 {
            0.0
        } else {
            elapsed / result_iterations as f64
        };
        let obfuscated = self.is_safe();
        let shown = |value: f64| if obfuscated { obfuscate(value) } else { value };
        let count = |at: Instant| u64::try_from(at.duration_since(self.epoch()).as_nanos()).unwrap_or(u64::MAX);

        TimingReport {
            requested,
            actual,
            result_iterations,
            code,
            error,
            start_count: count(start),
            stop_count: count(stop),
            average: shown(average),
            minimum: shown(minimum.map_or(0.0, micros)),
            maximum: shown(maximum.map_or(0.0, micros)),
            statistics: options.statistics,
            obfuscated,
        }
    }
}

/* ===================== Command ===================== */

pub fn cmd_time(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[
        OptionSpec::value("-timeout"),
        OptionSpec::value("-statistics"),
        OptionSpec::value("-breakOk"),
        OptionSpec::value("-errorOk"),
        OptionSpec::value("-noCancel"),
        OptionSpec::value("-globalCancel"),
        OptionSpec::value("-noHalt"),
        OptionSpec::value("-noEvent"),
        OptionSpec::value("-noExit"),
    ];

    let Some(script) = words.get(1) else {
        return Err(wrong_args(USAGE));
    };
    let (requested, first_option) = match words.get(2).map(|count| parse_int(count)) {
        Some(Ok(count)) => (count, 3),
        Some(Err(_)) | None => (1, 2),
    };
    let (parsed, index) = parse_options(interp, SPECS, words, first_option)?;
    if index != words.len() {
        return Err(wrong_args(USAGE));
    }

    let flag = |name: &str| parsed.bool_value(name).map(|value| value.unwrap_or(false));
    let options = TimeOptions {
        timeout: parsed.int_value("-timeout")?.and_then(timeout_from_millis),
        statistics: flag("-statistics")?,
        break_ok: flag("-breakOk")?,
        error_ok: flag("-errorOk")?,
        no_cancel: flag("-noCancel")?,
        global_cancel: flag("-globalCancel")?,
        no_halt: flag("-noHalt")?,
        no_event: flag("-noEvent")?,
        no_exit: flag("-noExit")?,
    };

    let report = interp.time_script(script, requested, options)?;
    Ok(report.to_string())
}
