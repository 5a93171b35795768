//! Start/end/error events for a named operation
//!
//! Each event carries `component`, `op` and `event` from the canonical
//! schema; anything after the fixed arguments is passed to `tracing` as extra
//! fields (`run_id = %ctx.run_id`, `keys_new = counts.new`, ...).

/// `event=start` at info
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::scdx_core_types::schema::EVENT_START,
            $($($field)*)?
        );
    };
}

/// `event=end` at info; `duration_ms` is required
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::scdx_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($($field)*)?
        );
    };
}

/// `event=end_error` at error, with the error's kind and stable code
///
/// `$err` is anything convertible into `ExError`, so a pipeline
/// `ScdxError` can be logged without converting it first.
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::scdx_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
            $($($field)*)?
        );
    }};
}
