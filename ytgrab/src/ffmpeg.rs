//! One-time download of a portable ffmpeg build for yt-dlp's post-processing.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tokio::io::AsyncWriteExt;

use crate::config::Config;

const RELEASE_BASE: &str = "https://github.com/yt-dlp/FFmpeg-Builds/releases/download/latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarXz
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegRelease {
    pub url: String,
    pub kind: ArchiveKind,
    pub binary_name: &'static str,
    pub probe_name: &'static str
}

impl FfmpegRelease {
    /// Picks the build for an operating system name (as in `std::env::consts::OS`)
    /// and pointer width in bits.
    pub fn for_platform(os: &str, pointer_width: u32) -> anyhow::Result<Self> {
        if pointer_width != 64 {
            bail!("32-bit systems are not supported");
        }

        let (asset, kind, binary_name, probe_name) = match os {
            "windows" => ("ffmpeg-master-latest-win64-gpl.zip", ArchiveKind::Zip, "ffmpeg.exe", "ffprobe.exe"),
            "linux" => ("ffmpeg-master-latest-linux64-gpl.tar.xz", ArchiveKind::TarXz, "ffmpeg", "ffprobe"),
            "macos" => ("ffmpeg-master-latest-macos64-gpl.zip", ArchiveKind::Zip, "ffmpeg", "ffprobe"),
            other => bail!("unsupported system: {other}")
        };

        Ok(Self {
            url: format!("{RELEASE_BASE}/{asset}"),
            kind,
            binary_name,
            probe_name
        })
    }

    fn binaries(&self) -> [&'static str; 2] {
        [self.binary_name, self.probe_name]
    }

    fn is_installed_in(&self, dir: &Path) -> bool {
        self.binaries().iter().all(|name| dir.join(name).is_file())
    }

    pub fn current() -> anyhow::Result<Self> {
        let pointer_width = if cfg!(target_pointer_width = "64") { 64 } else { 32 };
        Self::for_platform(std::env::consts::OS, pointer_width)
    }
}

/// Decides what to pass to `--ffmpeg-location`, downloading ffmpeg if needed.
///
/// `None` means yt-dlp should find ffmpeg on `PATH` by itself.
pub async fn resolve_location(config: &Config) -> anyhow::Result<Option<PathBuf>> {
    if let Some(ref location) = config.ffmpeg_location {
        return Ok(Some(location.clone()));
    }

    if !config.ffmpeg_auto_download {
        return Ok(None);
    }

    let release = FfmpegRelease::current()?;
    ensure_ffmpeg(&config.ffmpeg_dir, &release).await.map(Some)
}

/// Makes sure `dir` holds the ffmpeg binaries from `release` and returns `dir`.
pub async fn ensure_ffmpeg(dir: &Path, release: &FfmpegRelease) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    if release.is_installed_in(dir) {
        tracing::debug!("ffmpeg already present in {}", dir.display());
        return Ok(dir.to_path_buf());
    }

    let archive_path = dir.join("ffmpeg_archive");

    tracing::info!("Downloading ffmpeg from {}", release.url);
    if let Err(e) = download_archive(&release.url, &archive_path).await {
        remove_if_present(&archive_path).await;
        return Err(e);
    }

    tracing::info!("Extracting ffmpeg into {}", dir.display());
    let extracted = install_from_archive(release, &archive_path, dir).await?;

    tracing::info!("Installed {}", extracted.join(", "));
    Ok(dir.to_path_buf())
}

/// Extracts the binaries and removes the archive. A partial install is rolled back.
async fn install_from_archive(
    release: &FfmpegRelease,
    archive_path: &Path,
    dir: &Path
) -> anyhow::Result<Vec<String>> {
    let kind = release.kind;
    let archive = archive_path.to_path_buf();
    let target = dir.to_path_buf();
    let result = tokio::task::spawn_blocking(move || extract_binaries(kind, &archive, &target))
        .await
        .context("ffmpeg extraction task failed")
        .and_then(|extraction| extraction)
        .and_then(|extracted| {
            match release.binaries().into_iter().find(|name| !extracted.iter().any(|e| e == name)) {
                Some(missing) => bail!("{missing} was not found in the ffmpeg archive"),
                None => Ok(extracted)
            }
        });

    remove_if_present(archive_path).await;

    if result.is_err() {
        for name in release.binaries() {
            remove_if_present(&dir.join(name)).await;
        }
    }

    result
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e)
    }
}

async fn download_archive(url: &str, path: &Path) -> anyhow::Result<()> {
    let mut response = reqwest::get(url).await?.error_for_status()?;
    let mut file = tokio::fs::File::create(path).await?;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(())
}

/// Name to install an archive entry under, if it is an ffmpeg tool inside a `bin/` folder.
fn binary_file_name(entry_path: &Path) -> Option<String> {
    let name = entry_path.file_name()?.to_str()?;
    let in_bin = entry_path
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|parent| parent == "bin");

    (in_bin && (name.starts_with("ffmpeg") || name.starts_with("ffprobe"))).then(|| name.to_string())
}

fn extract_binaries(kind: ArchiveKind, archive: &Path, target: &Path) -> anyhow::Result<Vec<String>> {
    let file = File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;

    let extracted = match kind {
        ArchiveKind::Zip => extract_zip(file, target)?,
        ArchiveKind::TarXz => extract_tar_xz(file, target)?
    };

    for name in &extracted {
        make_executable(&target.join(name))?;
    }

    Ok(extracted)
}

fn extract_zip(file: File, target: &Path) -> anyhow::Result<Vec<String>> {
    let mut archive = zip::ZipArchive::new(file).context("failed to read ffmpeg archive")?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() {
            continue;
        }

        let normalized = entry.name().replace('\\', "/");
        if let Some(name) = binary_file_name(Path::new(&normalized)) {
            let mut output = File::create(target.join(&name))?;
            io::copy(&mut entry, &mut output)?;
            extracted.push(name);
        }
    }

    Ok(extracted)
}

fn extract_tar_xz(file: File, target: &Path) -> anyhow::Result<Vec<String>> {
    let mut archive = tar::Archive::new(xz2::read::XzDecoder::new(file));
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.into_owned();
        if let Some(name) = binary_file_name(&path) {
            entry.unpack(target.join(&name))?;
            extracted.push(name);
        }
    }

    Ok(extracted)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_release_for_platform() {
        let linux = FfmpegRelease::for_platform("linux", 64).unwrap();
        assert_eq!(linux.kind, ArchiveKind::TarXz);
        assert!(linux.url.ends_with("ffmpeg-master-latest-linux64-gpl.tar.xz"));
        assert_eq!(linux.binary_name, "ffmpeg");

        let windows = FfmpegRelease::for_platform("windows", 64).unwrap();
        assert_eq!(windows.kind, ArchiveKind::Zip);
        assert_eq!(windows.binary_name, "ffmpeg.exe");
        assert_eq!(windows.probe_name, "ffprobe.exe");

        let macos = FfmpegRelease::for_platform("macos", 64).unwrap();
        assert!(macos.url.ends_with("ffmpeg-master-latest-macos64-gpl.zip"));
    }

    #[test]
    fn test_release_rejects_unsupported_platforms() {
        let err = FfmpegRelease::for_platform("linux", 32).unwrap_err();
        assert_eq!(err.to_string(), "32-bit systems are not supported");

        let err = FfmpegRelease::for_platform("freebsd", 64).unwrap_err();
        assert_eq!(err.to_string(), "unsupported system: freebsd");
    }

    #[test]
    fn test_binary_file_name() {
        assert_eq!(
            binary_file_name(Path::new("ffmpeg-master-latest-linux64-gpl/bin/ffprobe")),
            Some("ffprobe".to_string())
        );
        assert_eq!(
            binary_file_name(Path::new("ffmpeg-master-latest-win64-gpl/bin/ffmpeg.exe")),
            Some("ffmpeg.exe".to_string())
        );
        assert_eq!(binary_file_name(Path::new("ffmpeg-master/doc/ffmpeg-all.html")), None);
        assert_eq!(binary_file_name(Path::new("ffmpeg-master/bin/ffplay")), None);
    }

    #[test]
    fn test_extract_zip_flattens_binaries() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("ffmpeg_archive");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive_path).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            for name in ["build/bin/ffmpeg", "build/bin/ffprobe", "build/LICENSE.txt"] {
                writer.start_file(name, options).unwrap();
                writer.write_all(b"binary").unwrap();
            }
            writer.finish().unwrap();
        }

        let mut extracted = extract_binaries(ArchiveKind::Zip, &archive_path, temp.path()).unwrap();
        extracted.sort();
        assert_eq!(extracted, vec!["ffmpeg", "ffprobe"]);
        assert_eq!(std::fs::read(temp.path().join("ffmpeg")).unwrap(), b"binary");
        assert!(!temp.path().join("LICENSE.txt").exists());
    }

    #[test]
    fn test_extract_tar_xz_flattens_binaries() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("ffmpeg_archive");
        {
            let encoder = xz2::write::XzEncoder::new(File::create(&archive_path).unwrap(), 6);
            let mut builder = tar::Builder::new(encoder);
            for name in ["build/bin/ffmpeg", "build/doc/ffmpeg.html"] {
                let data = b"binary";
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, &data[..]).unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }

        let extracted = extract_binaries(ArchiveKind::TarXz, &archive_path, temp.path()).unwrap();
        assert_eq!(extracted, vec!["ffmpeg"]);
        assert!(temp.path().join("ffmpeg").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(temp.path().join("ffmpeg")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn test_ensure_ffmpeg_skips_existing_install() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("ffmpeg"), b"binary").unwrap();
        std::fs::write(temp.path().join("ffprobe"), b"binary").unwrap();

        let release = FfmpegRelease {
            url: "http://127.0.0.1:9/unreachable.tar.xz".to_string(),
            kind: ArchiveKind::TarXz,
            binary_name: "ffmpeg",
            probe_name: "ffprobe"
        };
        let dir = ensure_ffmpeg(temp.path(), &release).await.unwrap();
        assert_eq!(dir, temp.path());
    }

    #[tokio::test]
    async fn test_ensure_ffmpeg_propagates_network_failure() {
        let temp = tempfile::tempdir().unwrap();
        let release = FfmpegRelease {
            url: "http://127.0.0.1:9/unreachable.tar.xz".to_string(),
            kind: ArchiveKind::TarXz,
            binary_name: "ffmpeg",
            probe_name: "ffprobe"
        };
        assert!(ensure_ffmpeg(temp.path(), &release).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_location_prefers_explicit_path() {
        let config = Config {
            ffmpeg_location: Some(PathBuf::from("/usr/bin/ffmpeg")),
            ..Config::default()
        };
        assert_eq!(resolve_location(&config).await.unwrap(), Some(PathBuf::from("/usr/bin/ffmpeg")));

        let config = Config {
            ffmpeg_auto_download: false,
            ..Config::default()
        };
        assert_eq!(resolve_location(&config).await.unwrap(), None);
    }

    fn linux_release() -> FfmpegRelease {
        FfmpegRelease {
            url: "http://127.0.0.1:9/unreachable.tar.xz".to_string(),
            kind: ArchiveKind::TarXz,
            binary_name: "ffmpeg",
            probe_name: "ffprobe"
        }
    }

    fn write_zip(path: &Path, entries: &[&str]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for name in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(b"binary").unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_half_installed_directory_is_not_skipped() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("ffmpeg"), b"binary").unwrap();

        assert!(!linux_release().is_installed_in(temp.path()));
        assert!(ensure_ffmpeg(temp.path(), &linux_release()).await.is_err());
        assert!(!temp.path().join("ffmpeg_archive").exists());
    }

    #[tokio::test]
    async fn test_incomplete_archive_rolls_back_install() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("ffmpeg_archive");
        write_zip(&archive_path, &["build/bin/ffmpeg", "build/doc/readme.txt"]);

        let release = FfmpegRelease {
            kind: ArchiveKind::Zip,
            ..linux_release()
        };
        let err = install_from_archive(&release, &archive_path, temp.path())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ffprobe was not found in the ffmpeg archive");
        assert!(!archive_path.exists());
        assert!(!temp.path().join("ffmpeg").exists());
    }

    #[tokio::test]
    async fn test_unreadable_archive_is_removed() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("ffmpeg_archive");
        std::fs::write(&archive_path, b"not an archive").unwrap();

        let release = FfmpegRelease {
            kind: ArchiveKind::Zip,
            ..linux_release()
        };
        assert!(install_from_archive(&release, &archive_path, temp.path()).await.is_err());
        assert!(!archive_path.exists());
    }

    #[tokio::test]
    async fn test_complete_archive_installs_both_tools() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("ffmpeg_archive");
        write_zip(&archive_path, &["build/bin/ffmpeg", "build/bin/ffprobe"]);

        let release = FfmpegRelease {
            kind: ArchiveKind::Zip,
            ..linux_release()
        };
        let mut extracted = install_from_archive(&release, &archive_path, temp.path()).await.unwrap();
        extracted.sort();
        assert_eq!(extracted, vec!["ffmpeg", "ffprobe"]);
        assert!(!archive_path.exists());
        assert!(release.is_installed_in(temp.path()));
    }
}
