//! utmpx reader for Linux.

use super::{LoginRecord, SessionError};
use chrono::{DateTime, TimeZone, Utc};

/// Convert a fixed-size, possibly unterminated C char field into a `String`.
fn field_to_string(field: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

fn login_time(secs: i64, usecs: i64) -> DateTime<Utc> {
    let nanos = (usecs.clamp(0, 999_999) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
}

/// Read all `USER_PROCESS` entries from the utmpx database.
///
/// The utmpx iteration API keeps process-global cursor state, so this must
/// only be called from one thread at a time. The sampling loop is the only
/// caller.
pub fn read_utmpx() -> Result<Vec<LoginRecord>, SessionError> {
    let mut records = Vec::new();

    unsafe {
        libc::setutxent();
        loop {
            let entry = libc::getutxent();
            if entry.is_null() {
                break;
            }
            let entry = &*entry;
            if entry.ut_type != libc::USER_PROCESS {
                continue;
            }

            let user = field_to_string(&entry.ut_user);
            if user.is_empty() {
                continue;
            }

            records.push(LoginRecord {
                user,
                line: field_to_string(&entry.ut_line),
                host: field_to_string(&entry.ut_host),
                started_at: login_time(entry.ut_tv.tv_sec as i64, entry.ut_tv.tv_usec as i64),
            });
        }
        libc::endutxent();
    }

    tracing::debug!(count = records.len(), "read utmpx login records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_to_string_stops_at_nul() {
        let mut field = [0 as libc::c_char; 8];
        for (i, b) in b"pts/3".iter().enumerate() {
            field[i] = *b as libc::c_char;
        }
        assert_eq!(field_to_string(&field), "pts/3");
    }

    #[test]
    fn test_field_to_string_unterminated() {
        let field = [b'a' as libc::c_char; 4];
        assert_eq!(field_to_string(&field), "aaaa");
    }

    #[test]
    fn test_login_time() {
        let t = login_time(1_700_000_000, 500_000);
        assert_eq!(t.timestamp(), 1_700_000_000);
        assert_eq!(t.timestamp_subsec_micros(), 500_000);
    }

    #[test]
    fn test_read_utmpx_does_not_fail() {
        let records = read_utmpx().unwrap();
        for r in records {
            assert!(!r.user.is_empty());
        }
    }
}
