/// Largest party a single reservation may carry.
pub const MAX_PARTY_SIZE: u32 = 10_000;

/// Longest booking label in bytes.
pub const MAX_LABEL_LEN: usize = 256;

/// Longest event duration when the end is derived from a duration.
pub const MAX_DURATION_HOURS: u32 = 24;

/// Commit attempts before a lost race is surfaced to the caller.
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Longest accepted request line on the service socket.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Upper bound on reservations held in one month ledger.
pub const MAX_RESERVATIONS_PER_MONTH: usize = 100_000;
