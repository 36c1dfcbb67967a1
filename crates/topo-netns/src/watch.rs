use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

/// One pass over the netns mount directory: every regular file's name is a
/// namespace (§4.D "Watch mechanism": directory listing diff, polled on a
/// short interval rather than a kernel inotify dependency).
pub async fn list_namespaces(dir: &Path) -> BTreeSet<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), %e, "failed to read netns directory");
            return BTreeSet::new();
        }
    };

    let mut names = BTreeSet::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if let Some(name) = entry.file_name().to_str() {
                    names.insert(name.to_string());
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(dir = %dir.display(), %e, "error while listing netns directory");
                break;
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_yields_empty_set() {
        let names = list_namespaces(Path::new("/nonexistent/path/for/topo-netns-tests")).await;
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn lists_files_in_a_real_directory() {
        let dir = tempdir();
        tokio::fs::write(dir.join("ns1"), b"").await.unwrap();
        tokio::fs::write(dir.join("ns2"), b"").await.unwrap();

        let names = list_namespaces(&dir).await;
        assert_eq!(names, BTreeSet::from(["ns1".to_string(), "ns2".to_string()]));

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("topo-netns-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
