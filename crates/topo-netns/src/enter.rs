use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Enter the network namespace bind-mounted at `path` (`setns(2)` with
/// `CLONE_NEWNET`, §4.D step 2). Affects only the calling OS thread, which
/// is why the namespace probe dedicates one native thread per namespace
/// rather than doing this on a shared tokio worker.
pub fn enter_netns(path: &Path) -> std::io::Result<()> {
    let file = File::open(path)?;
    let rc = unsafe { libc::setns(file.as_raw_fd(), libc::CLONE_NEWNET) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
