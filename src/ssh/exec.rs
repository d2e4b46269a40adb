use anyhow::{bail, Context, Result};
use openssh::Stdio;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use super::SshSession;

/// Shell side of [`SshSession::write_private_file`]; the content arrives on stdin.
fn private_write_command(path: &str) -> String {
    format!("umask 077 && cat > {}", path)
}

/// What a remote command left behind.
struct Completed {
    success: bool,
    status: String,
    stdout: String,
    stderr: String,
}

impl SshSession {
    async fn run(&self, cmd: &str) -> Result<Completed> {
        let output = self
            .session
            .command("bash")
            .arg("-c")
            .arg(cmd)
            .output()
            .await
            .with_context(|| format!("Failed to execute command on {}: {}", self.host, cmd))?;

        let completed = Completed {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!("[{}] {} -> {}", self.host, cmd, completed.status);
        Ok(completed)
    }

    /// Runs `cmd` under bash and returns stdout. A non-zero exit is an error
    /// carrying both streams.
    pub async fn exec(&self, cmd: &str) -> Result<String> {
        debug!("[{}] exec: {}", self.host, cmd);

        let done = self.run(cmd).await?;
        if !done.success {
            bail!(
                "Command failed on {} ({}): {}\nstdout: {}\nstderr: {}",
                self.host,
                done.status,
                cmd,
                done.stdout.trim(),
                done.stderr.trim()
            );
        }
        Ok(done.stdout)
    }

    /// Non-empty, trimmed stdout lines.
    pub async fn exec_lines(&self, cmd: &str) -> Result<Vec<String>> {
        Ok(self
            .exec(cmd)
            .await?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Exit status only.
    pub async fn exec_ok(&self, cmd: &str) -> Result<bool> {
        debug!("[{}] exec_ok: {}", self.host, cmd);
        Ok(self.run(cmd).await?.success)
    }

    pub async fn path_exists(&self, path: &str) -> Result<bool> {
        self.exec_ok(&format!("test -e {}", path)).await
    }

    /// Replaces `path` with `content`, readable by the login user only.
    /// The content travels over stdin so it never appears in the remote
    /// process list.
    pub async fn write_private_file(&self, path: &str, content: &str) -> Result<()> {
        debug!("[{}] write: {}", self.host, path);
        let failed = || format!("Failed to write {} on {}", path, self.host);

        let mut child = self
            .session
            .command("bash")
            .arg("-c")
            .arg(private_write_command(path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .await
            .with_context(failed)?;

        if let Some(mut stdin) = child.stdin().take() {
            stdin.write_all(content.as_bytes()).await.with_context(failed)?;
            stdin.shutdown().await.with_context(failed)?;
        }

        let output = child.wait_with_output().await.with_context(failed)?;
        if !output.status.success() {
            bail!(
                "{} ({}): {}",
                failed(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    pub async fn sudo_exec(&self, cmd: &str) -> Result<String> {
        self.exec(&format!("sudo bash -c '{}'", cmd.replace('\'', "'\\''")))
            .await
    }
}
