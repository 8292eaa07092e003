pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGTAP CONFIGURATION
# =============================================================================
# logtap polls an event-log export file, parses the records that appeared since
# the last run and pushes them to a Loki-compatible endpoint.
#
# Values may reference environment variables with $env{VAR_NAME}. Paths may
# start with ~ for the home directory.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logtap/config.yml
#   3. /etc/logtap/config.yml
#   4. ./config.yml

# =============================================================================
# SOURCE
# =============================================================================
source:
  # Export file to read. It is re-read in full on every poll.
  path: /var/log/export.txt

  # Time between polls
  interval: 5s

  # Records stamped at or before this time are never forwarded.
  # Format: YYYY-MM-DD HH:MM:SS
  start_time: "2024-01-01 00:00:00"

  # Zone the export's timestamps were written in, as +HH:MM or -HH:MM.
  # Defaults to this machine's local offset.
  # utc_offset: "+00:00"

# =============================================================================
# CURSOR
# =============================================================================
# Position of the last forwarded record, kept across restarts.
cursor:
  path: .pos.dat

# =============================================================================
# DISPATCH
# =============================================================================
dispatch:
  push_url: http://localhost:3100/loki/api/v1/push

  # Static labels attached to every pushed stream
  labels:
    job: logtap

  # A batch is sent when it holds batch_size records or batch_wait has passed,
  # whichever comes first.
  batch_wait: 1s
  batch_size: 100

  # Records buffered between the poller and the sender. The poller waits when
  # the queue is full.
  queue_capacity: 5000

  # Stamp records with their own time (shifted by utc_offset) instead of the
  # time they were queued.
  push_origin_ts: false

# =============================================================================
# SERVICE
# =============================================================================
service:
  # Write logs to <log_dir>/logtap.log instead of stderr
  # log_dir: /var/log/logtap

  # One of: trace, debug, info, warn, error. RUST_LOG overrides this.
  log_level: info
"#
    .to_string()
}
