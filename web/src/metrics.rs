//! Business metrics.
//!
//! Recorded through the `metrics` facade; the server installs the
//! Prometheus exporter. Without an installed recorder every call is a no-op,
//! which is what tests rely on.

use timebank_core::booking::BookingStatus;
use timebank_core::hours::Hours;

/// Booking transitions, labelled with the new status.
pub const BOOKINGS_TOTAL: &str = "timebank_bookings_total";
/// Hours settled by completed bookings and transfers.
pub const HOURS_EXCHANGED_TOTAL: &str = "timebank_hours_exchanged_total";
/// Completed direct transfers.
pub const TRANSFERS_TOTAL: &str = "timebank_transfers_total";
/// Open WebSocket connections.
pub const WS_CONNECTIONS: &str = "timebank_ws_connections";

/// Registers descriptions with the installed recorder.
pub fn describe() {
    metrics::describe_counter!(BOOKINGS_TOTAL, "Booking requests and transitions by resulting status");
    metrics::describe_gauge!(
        HOURS_EXCHANGED_TOTAL,
        "Hours moved between users by completions and transfers"
    );
    metrics::describe_counter!(TRANSFERS_TOTAL, "Completed direct credit transfers");
    metrics::describe_gauge!(WS_CONNECTIONS, "Open WebSocket connections");
}

/// Counts a booking entering `status`.
pub fn booking_transition(status: BookingStatus) {
    metrics::counter!(BOOKINGS_TOTAL, "transition" => status.as_str()).increment(1);
}

/// Adds settled hours. Hours are fractional, so the series is a
/// monotonically increasing gauge.
pub fn hours_exchanged(hours: Hours) {
    metrics::gauge!(HOURS_EXCHANGED_TOTAL).increment(hours.to_f64());
}

/// Counts a completed transfer.
pub fn transfer(hours: Hours) {
    metrics::counter!(TRANSFERS_TOTAL).increment(1);
    hours_exchanged(hours);
}

/// Tracks the number of open sockets.
pub fn ws_connected() {
    metrics::gauge!(WS_CONNECTIONS).increment(1.0);
}

/// See [`ws_connected`].
pub fn ws_disconnected() {
    metrics::gauge!(WS_CONNECTIONS).decrement(1.0);
}
