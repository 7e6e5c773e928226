use std::{fs::File, io::Read as _};

const STATM_PATH: &str = "/proc/self/statm";

/// Gets the resident set size of this process, in bytes.
///
/// If the resident set size cannot be determined, `None` is returned. This could be for a number of underlying
/// reasons, but should generally be considered an incredibly rare/unlikely event.
pub fn resident_set_size() -> Option<usize> {
    // statm is written as a single line with seven space-delimited integer fields, so a small stack buffer is plenty.
    let mut buf = [0; 256];
    let mut file = File::open(STATM_PATH).ok()?;
    let n = file.read(&mut buf).ok()?;
    if n == 0 || n == buf.len() {
        // If we read no bytes, or filled the entire buffer, something is very wrong.
        return None;
    }

    parse_statm_rss(&buf[..n], page_size()?)
}

fn parse_statm_rss(raw: &[u8], page_size: usize) -> Option<usize> {
    // Resident set size is the second field, measured in pages.
    let raw_rss_field = raw.split(|b| b.is_ascii_whitespace()).nth(1)?;
    let rss_pages = std::str::from_utf8(raw_rss_field).ok()?.parse::<usize>().ok()?;
    rss_pages.checked_mul(page_size)
}

fn page_size() -> Option<usize> {
    // SAFETY: `sysconf` has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        None
    } else {
        Some(page_size as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_statm_rss, resident_set_size};

    #[test]
    fn basic() {
        assert!(resident_set_size().is_some_and(|rss| rss > 0));
    }

    #[test]
    fn parse_statm() {
        assert_eq!(parse_statm_rss(b"5012 1203 611 1 0 2338 0\n", 4096), Some(1203 * 4096));
        assert_eq!(parse_statm_rss(b"5012\n", 4096), None);
        assert_eq!(parse_statm_rss(b"5012 abc 611\n", 4096), None);
    }
}
