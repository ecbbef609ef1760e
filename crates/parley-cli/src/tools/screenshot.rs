//! Screen capture tool

use async_trait::async_trait;
use base64::Engine;
use parley_agent::tool::{Attachment, Tool, ToolContext, ToolResult};
use parley_ai::Content;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Captures the whole virtual desktop (all monitors), DPI aware.
/// The output path comes from `PARLEY_SCREENSHOT`.
const WINDOWS_CAPTURE: &str = r#"
Add-Type -TypeDefinition 'using System.Runtime.InteropServices; public class DPI { [DllImport("user32.dll")] public static extern bool SetProcessDPIAware(); }'
[void][DPI]::SetProcessDPIAware()
Add-Type -AssemblyName System.Windows.Forms,System.Drawing
$vs = [System.Windows.Forms.SystemInformation]::VirtualScreen
$bitmap = New-Object System.Drawing.Bitmap($vs.Width, $vs.Height)
$g = [System.Drawing.Graphics]::FromImage($bitmap)
$g.CopyFromScreen($vs.Left, $vs.Top, 0, 0, $vs.Size)
$bitmap.Save($env:PARLEY_SCREENSHOT, [System.Drawing.Imaging.ImageFormat]::Png)
$g.Dispose()
$bitmap.Dispose()
"#;

/// One way to capture the screen into a PNG file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

/// Candidate capture commands for this platform, tried in order
pub fn capture_commands(output: &Path) -> Vec<CaptureCommand> {
    let out = output.to_string_lossy().to_string();
    if cfg!(target_os = "windows") {
        vec![CaptureCommand {
            program: "powershell",
            args: vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-Command".into(),
                WINDOWS_CAPTURE.trim().into(),
            ],
        }]
    } else if cfg!(target_os = "macos") {
        vec![CaptureCommand {
            program: "screencapture",
            args: vec!["-x".into(), out],
        }]
    } else {
        vec![
            CaptureCommand {
                program: "grim",
                args: vec![out.clone()],
            },
            CaptureCommand {
                program: "scrot",
                args: vec!["--overwrite".into(), out.clone()],
            },
            CaptureCommand {
                program: "import",
                args: vec!["-window".into(), "root".into(), out],
            },
        ]
    }
}

/// Tool that captures the screen and returns it as an image
pub struct ScreenshotTool {
    timeout: Duration,
}

impl ScreenshotTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn capture(&self, output: &Path) -> Result<Vec<u8>, String> {
        let mut failures = Vec::new();

        for candidate in capture_commands(output) {
            let mut cmd = Command::new(candidate.program);
            cmd.args(&candidate.args)
                .env("PARLEY_SCREENSHOT", output)
                .kill_on_drop(true);

            match tokio::time::timeout(self.timeout, cmd.output()).await {
                Ok(Ok(out)) if out.status.success() => {
                    return tokio::fs::read(output)
                        .await
                        .map_err(|e| format!("could not read capture: {}", e));
                }
                Ok(Ok(out)) => failures.push(format!(
                    "{} exited with {}: {}",
                    candidate.program,
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                )),
                Ok(Err(e)) => failures.push(format!("{}: {}", candidate.program, e)),
                Err(_) => failures.push(format!(
                    "{} timed out after {} seconds",
                    candidate.program,
                    self.timeout.as_secs()
                )),
            }
        }

        Err(failures.join("; "))
    }
}

impl Default for ScreenshotTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn temp_capture_path() -> PathBuf {
    std::env::temp_dir().join(format!("parley-screenshot-{}.png", uuid::Uuid::new_v4()))
}

#[async_trait]
impl Tool for ScreenshotTool {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn description(&self) -> &str {
        "Take a screenshot of the entire screen. Returns the screenshot as an image so you can see what is currently displayed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        _arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> ToolResult {
        let path = temp_capture_path();
        let captured = self.capture(&path).await;
        let _ = tokio::fs::remove_file(&path).await;

        match captured {
            Ok(png) => {
                tracing::info!(tool = "screenshot", bytes = png.len(), "screenshot captured");
                let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
                ToolResult::with_content(vec![Content::image(encoded, "image/png")])
                    .with_attachment(Attachment::png(png))
            }
            Err(e) => {
                tracing::warn!(tool = "screenshot", error = %e, "screenshot failed");
                ToolResult::error(format!("Screenshot failed: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_commands_target_output_path() {
        let path = Path::new("/tmp/shot.png");
        let commands = capture_commands(path);
        assert!(!commands.is_empty());

        if cfg!(target_os = "linux") {
            let programs: Vec<_> = commands.iter().map(|c| c.program).collect();
            assert_eq!(programs, vec!["grim", "scrot", "import"]);
            for c in &commands {
                assert_eq!(c.args.last().map(String::as_str), Some("/tmp/shot.png"));
            }
        }
    }

    #[test]
    fn test_temp_capture_paths_are_unique() {
        let a = temp_capture_path();
        let b = temp_capture_path();
        assert_ne!(a, b);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("png"));
    }
}
