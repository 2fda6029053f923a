//! Shared plumbing for invoking external executables

use crate::error::ToolError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Run `cmd` to completion, optionally feeding `stdin`, and check that it
/// exited zero and left a file at `output`.
///
/// The child is killed if the returned future is dropped.
pub(crate) async fn run(
    mut cmd: Command,
    tool: &str,
    stdin: Option<&[u8]>,
    output: &Path,
) -> Result<(), ToolError> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ToolError::Launch {
        tool: tool.to_string(),
        source,
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            match pipe.write_all(input).await {
                Ok(()) => {}
                // Tool exited without reading; its exit status decides
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(source) => {
                    return Err(ToolError::Stdin {
                        tool: tool.to_string(),
                        source,
                    })
                }
            }
            // Closing the pipe lets the tool see EOF after the answer
            drop(pipe);
        }
    }

    let result = child
        .wait_with_output()
        .await
        .map_err(|source| ToolError::Launch {
            tool: tool.to_string(),
            source,
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: result.status,
            stderr,
        });
    }

    if !output.exists() {
        return Err(ToolError::MissingOutput {
            tool: tool.to_string(),
            path: output.to_path_buf(),
        });
    }

    Ok(())
}
