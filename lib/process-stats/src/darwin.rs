use std::mem::{size_of, MaybeUninit};

/// Gets the resident set size of this process, in bytes.
///
/// Queried through `proc_pidinfo` with the `PROC_PIDTASKINFO` flavor, which reports the same resident size as `ps`.
/// Returns `None` if the kernel refuses the query or writes a short answer.
pub fn resident_set_size() -> Option<usize> {
    let mut task_info = MaybeUninit::<libc::proc_taskinfo>::uninit();
    let expected_len = libc::c_int::try_from(size_of::<libc::proc_taskinfo>()).ok()?;

    // SAFETY: The buffer is valid for writes of `expected_len` bytes.
    let written = unsafe {
        libc::proc_pidinfo(
            libc::getpid(),
            libc::PROC_PIDTASKINFO,
            0,
            task_info.as_mut_ptr().cast(),
            expected_len,
        )
    };
    if written != expected_len {
        return None;
    }

    // SAFETY: `proc_pidinfo` filled the whole struct.
    let task_info = unsafe { task_info.assume_init() };
    usize::try_from(task_info.pti_resident_size).ok()
}

#[cfg(test)]
mod tests {
    use super::resident_set_size;

    #[test]
    fn resident_size_is_reported() {
        assert!(resident_set_size().is_some_and(|rss| rss > 0));
    }
}
