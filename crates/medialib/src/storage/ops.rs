use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Filesystem primitives used by the transfer engine.
///
/// None of the placing operations may overwrite: they fail with
/// `ErrorKind::AlreadyExists` when the destination is taken.
pub trait FileOps: Send + Sync {
    fn hard_link(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Copies `src` to a newly created `dst`, returning the bytes written.
    fn copy_new(&self, src: &Path, dst: &Path) -> io::Result<u64>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`FileOps`] on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileOps;

impl FileOps for LocalFileOps {
    fn hard_link(&self, src: &Path, dst: &Path) -> io::Result<()> {
        std::fs::hard_link(src, dst)
    }

    fn copy_new(&self, src: &Path, dst: &Path) -> io::Result<u64> {
        let mut reader = File::open(src)?;
        // create_new is O_CREAT | O_EXCL: the existence check and the
        // creation are one step
        let mut writer = OpenOptions::new().write(true).create_new(true).open(dst)?;

        match io::copy(&mut reader, &mut writer).and_then(|n| writer.sync_all().map(|_| n)) {
            Ok(n) => Ok(n),
            Err(e) => {
                drop(writer);
                let _ = std::fs::remove_file(dst);
                Err(e)
            }
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}
