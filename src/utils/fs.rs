use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Replace `path` with `contents` so that a reader sees either the old file
/// or the new one, never a torn write.
///
/// The data goes to a sibling temp file that is synced to disk before the
/// rename, and on unix the directory entry is synced after it, so the new
/// contents also survive a power loss once this returns.
pub async fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;

    #[cfg(unix)]
    if let Some(parent) = parent {
        tokio::fs::File::open(parent).await?.sync_all().await?;
    }
    Ok(())
}
