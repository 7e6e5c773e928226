use std::{mem::MaybeUninit, time::Duration};

/// Gets the total CPU time (user and system) consumed by this process so far.
///
/// If the CPU time cannot be determined, `None` is returned.
pub fn cpu_time() -> Option<Duration> {
    let mut usage = MaybeUninit::<libc::rusage>::uninit();

    // SAFETY: We're passing a valid pointer to an output struct of the correct type.
    let result = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if result != 0 {
        return None;
    }

    // SAFETY: `getrusage` succeeded, so the structure has been populated.
    let usage = unsafe { usage.assume_init() };
    Some(timeval_to_duration(&usage.ru_utime) + timeval_to_duration(&usage.ru_stime))
}

/// Gets the host name of this machine.
///
/// If the host name cannot be determined, or is empty or not valid UTF-8, `None` is returned.
pub fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];

    // SAFETY: We're passing a valid buffer along with its length. `gethostname` truncates if the buffer is too small.
    let result = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if result != 0 {
        return None;
    }

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let hostname = std::str::from_utf8(&buf[..len]).ok()?.trim();
    if hostname.is_empty() {
        None
    } else {
        Some(hostname.to_string())
    }
}

fn timeval_to_duration(tv: &libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}
