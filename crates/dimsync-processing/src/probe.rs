//! Local file probing with `ffprobe`.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dimsync_core::{Dimensions, DimsyncError, ProbeConfig};
use serde::Deserialize;
use tokio::process::Command;

const TOOL: &str = "ffprobe";

/// Reads display dimensions of a locally stored video.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// `Ok(None)` when the file has no usable video stream.
    async fn probe(&self, filename: &str) -> Result<Option<Dimensions>, DimsyncError>;
}

/// Reject tool paths that could be interpreted by a shell or traverse directories.
fn validate_path(path: &str) -> Result<(), DimsyncError> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(DimsyncError::InvalidPath(format!(
            "path contains dangerous characters: {}",
            path
        )));
    }

    if path.contains("..") {
        return Err(DimsyncError::InvalidPath(format!(
            "path contains directory traversal: {}",
            path
        )));
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<i64>,
    height: Option<i64>,
    #[serde(default)]
    sample_aspect_ratio: Option<String>,
    #[serde(default)]
    display_aspect_ratio: Option<String>,
}

/// Parse `num:den`. `None` for `N/A`, malformed input or a zero term.
fn parse_ratio(raw: &str) -> Option<(u64, u64)> {
    let (num, den) = raw.trim().split_once(':')?;
    let num: u64 = num.trim().parse().ok()?;
    let den: u64 = den.trim().parse().ok()?;
    if num == 0 || den == 0 {
        return None;
    }
    Some((num, den))
}

/// Apply the sample aspect ratio to the coded width, rounding to nearest.
pub fn display_dimensions(width: u32, height: u32, sar: Option<&str>) -> Option<Dimensions> {
    let width = match sar.and_then(parse_ratio) {
        Some((num, den)) if num != den => {
            let scaled = (u64::from(width) * num + den / 2) / den;
            u32::try_from(scaled).ok()?
        }
        _ => width,
    };
    Dimensions::new(width, height)
}

/// [`MetadataProbe`] backed by the `ffprobe` binary.
pub struct FfprobeProbe {
    ffprobe_path: String,
    storage_root: PathBuf,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self, DimsyncError> {
        validate_path(&config.ffprobe_path).map_err(|_| {
            DimsyncError::Config(format!(
                "Invalid FFPROBE_PATH: contains dangerous characters: {}",
                config.ffprobe_path
            ))
        })?;

        if !config.ffprobe_path.chars().all(|c| {
            c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\'
        }) {
            return Err(DimsyncError::Config(
                "Invalid FFPROBE_PATH: contains unsafe characters".to_string(),
            ));
        }

        Ok(Self {
            ffprobe_path: config.ffprobe_path.clone(),
            storage_root: config.storage_root.clone(),
            timeout: config.timeout,
        })
    }

    /// Resolve an asset filename under the storage root.
    ///
    /// Only the path shape is checked. The file is passed to ffprobe as a
    /// single argument, so upload names with spaces, `&`, parentheses or
    /// doubled dots are fine as long as no component leaves the root.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, DimsyncError> {
        let relative = Path::new(filename);
        if filename.trim().is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(DimsyncError::InvalidPath(format!(
                "filename must be relative to the storage root: {}",
                filename
            )));
        }

        Ok(self.storage_root.join(relative))
    }

    async fn run(&self, path: &Path) -> Result<Vec<u8>, DimsyncError> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.ffprobe_path)
                .args([
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=width,height,display_aspect_ratio,sample_aspect_ratio",
                    "-of",
                    "json",
                ])
                .arg(path)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| DimsyncError::Timeout {
            operation: TOOL,
            seconds: self.timeout.as_secs(),
        })?
        .map_err(|e| DimsyncError::ToolInvocation {
            tool: TOOL.to_string(),
            exit_code: None,
            stderr: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(DimsyncError::ToolInvocation {
                tool: TOOL.to_string(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MetadataProbe for FfprobeProbe {
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path,
        ffprobe.operation = "probe"
    ))]
    async fn probe(&self, filename: &str) -> Result<Option<Dimensions>, DimsyncError> {
        let start = Instant::now();
        let path = self.resolve(filename)?;
        let stdout = self.run(&path).await?;

        let parsed: ProbeOutput = serde_json::from_slice(&stdout)
            .map_err(|e| DimsyncError::Parse(format!("Failed to parse ffprobe output: {}", e)))?;

        let Some(stream) = parsed.streams.into_iter().next() else {
            tracing::debug!(path = %path.display(), "No video stream found");
            return Ok(None);
        };

        let (Some(width), Some(height)) = (stream.width, stream.height) else {
            return Ok(None);
        };
        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            return Ok(None);
        };

        let dimensions =
            display_dimensions(width, height, stream.sample_aspect_ratio.as_deref());

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            coded_width = width,
            coded_height = height,
            sample_aspect_ratio = stream.sample_aspect_ratio.as_deref().unwrap_or("N/A"),
            display_aspect_ratio = stream.display_aspect_ratio.as_deref().unwrap_or("N/A"),
            "Video probe completed"
        );

        Ok(dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_at(ffprobe_path: &str, root: &Path, timeout: Duration) -> FfprobeProbe {
        FfprobeProbe::new(&ProbeConfig {
            ffprobe_path: ffprobe_path.to_string(),
            storage_root: root.to_path_buf(),
            timeout,
        })
        .unwrap()
    }

    #[test]
    fn sample_aspect_ratio_scales_width() {
        let dims = display_dimensions(1280, 720, Some("2:1")).unwrap();
        assert_eq!((dims.width, dims.height), (2560, 720));

        let dims = display_dimensions(720, 576, Some("16:15")).unwrap();
        assert_eq!(dims.width, 768);

        // 1000 * 2 / 3 = 666.67
        let dims = display_dimensions(1000, 500, Some("2:3")).unwrap();
        assert_eq!(dims.width, 667);
    }

    #[test]
    fn neutral_or_unusable_ratios_keep_width() {
        for sar in [Some("1:1"), Some("N/A"), Some("0:1"), Some("4:0"), Some("junk"), None] {
            let dims = display_dimensions(1920, 1080, sar).unwrap();
            assert_eq!(dims.width, 1920, "{sar:?}");
        }
        assert!(display_dimensions(0, 1080, None).is_none());
    }

    #[test]
    fn rejects_unsafe_tool_paths() {
        for path in ["ffprobe; rm -rf /", "$(ffprobe)", "ff probe"] {
            let result = FfprobeProbe::new(&ProbeConfig {
                ffprobe_path: path.to_string(),
                ..ProbeConfig::default()
            });
            assert!(matches!(result, Err(DimsyncError::Config(_))), "{path}");
        }
    }

    #[test]
    fn resolves_only_inside_storage_root() {
        let probe = probe_at("ffprobe", Path::new("/srv/uploads"), Duration::from_secs(1));
        assert_eq!(
            probe.resolve("videos/clip.mp4").unwrap(),
            PathBuf::from("/srv/uploads/videos/clip.mp4")
        );
        for name in ["Holiday Clip (1).mp4", "Q&A.mp4", "take..2.mp4", "./a/$b.mp4"] {
            assert!(probe.resolve(name).unwrap().starts_with("/srv/uploads"), "{name}");
        }
        for bad in ["../etc/passwd", "/etc/passwd", "", "  ", "a/../../b", "clips/.."] {
            assert!(
                matches!(probe.resolve(bad), Err(DimsyncError::InvalidPath(_))),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn missing_tool_is_an_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe_at(
            "/nonexistent/bin/ffprobe",
            dir.path(),
            Duration::from_secs(5),
        );
        let err = probe.probe("clip.mp4").await.unwrap_err();
        assert!(matches!(
            err,
            DimsyncError::ToolInvocation { exit_code: None, .. }
        ));
    }

    // All scripted runs live in one test so no other test forks while a
    // script file is still open for writing.
    #[cfg(unix)]
    #[tokio::test]
    async fn fake_ffprobe_scenarios() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let write_script = |name: &str, body: &str| -> String {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        };
        let timeout = Duration::from_secs(10);

        let anamorphic = write_script(
            "anamorphic",
            r#"echo '{"streams":[{"width":1280,"height":720,"sample_aspect_ratio":"2:1","display_aspect_ratio":"32:9"}]}'"#,
        );
        let dims = probe_at(&anamorphic, dir.path(), timeout)
            .probe("clip.mp4")
            .await
            .unwrap()
            .unwrap();
        assert_eq!((dims.width, dims.height), (2560, 720));

        let square = write_script(
            "square",
            r#"for last; do :; done
case "$last" in
  *"/Holiday Clip (1).mp4") echo '{"streams":[{"width":1920,"height":1080,"sample_aspect_ratio":"1:1"}]}' ;;
  *) echo "unexpected input: $last" >&2; exit 3 ;;
esac"#,
        );
        let dims = probe_at(&square, dir.path(), timeout)
            .probe("Holiday Clip (1).mp4")
            .await
            .unwrap()
            .unwrap();
        assert_eq!((dims.width, dims.height), (1920, 1080));

        let no_stream = write_script("no_stream", r#"echo '{"streams":[]}'"#);
        assert_eq!(
            probe_at(&no_stream, dir.path(), timeout)
                .probe("clip.mp4")
                .await
                .unwrap(),
            None
        );

        let empty_object = write_script("empty_object", r#"echo '{}'"#);
        assert_eq!(
            probe_at(&empty_object, dir.path(), timeout)
                .probe("clip.mp4")
                .await
                .unwrap(),
            None
        );

        let zero_width = write_script(
            "zero_width",
            r#"echo '{"streams":[{"width":0,"height":720}]}'"#,
        );
        assert_eq!(
            probe_at(&zero_width, dir.path(), timeout)
                .probe("clip.mp4")
                .await
                .unwrap(),
            None
        );

        let failing = write_script("failing", "echo 'moov atom not found' >&2\nexit 1");
        match probe_at(&failing, dir.path(), timeout)
            .probe("clip.mp4")
            .await
            .unwrap_err()
        {
            DimsyncError::ToolInvocation {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "moov atom not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let garbage = write_script("garbage", "echo 'not json'");
        assert!(matches!(
            probe_at(&garbage, dir.path(), timeout)
                .probe("clip.mp4")
                .await
                .unwrap_err(),
            DimsyncError::Parse(_)
        ));

        let hanging = write_script("hanging", "exec sleep 5");
        assert!(matches!(
            probe_at(&hanging, dir.path(), Duration::from_millis(200))
                .probe("clip.mp4")
                .await
                .unwrap_err(),
            DimsyncError::Timeout { operation: "ffprobe", .. }
        ));
    }
}
