//! Real SSH-backed [`AgentTransport`], adapted from the teacher's
//! interactive-shell connection setup (`Client::connect_with_config`,
//! `get_channel`, the `tokio::select!` I/O pump) into a one-shot
//! `exec` session plus an SFTP upload of the tarball and agent script.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_ssh2_tokio::{AuthMethod, Client, ServerCheckMethod};
use russh::ChannelMsg;
use tokio::sync::mpsc;

use crate::error::ForgeError;
use crate::ssh::worker::{AgentOutput, AgentTransport};

/// Client config for every outbound connection: russh's own default
/// algorithm preferences, with the connect timeout applied as the
/// handshake's inactivity ceiling.
fn client_config(connect_timeout: Duration) -> russh::client::Config {
    russh::client::Config { inactivity_timeout: Some(connect_timeout), ..Default::default() }
}

/// The build-agent script uploaded alongside the tarball. Prints phase
/// sentinels (`BUILD OK` / `BUILD FAILED`) as it drives
/// `configure && make && make check && make install`.
pub const AGENT_SCRIPT: &str = include_str!("agent.sh");

enum Connection {
    Pending { user: String, host: String, port: u16 },
    Connected { client: Client, remote_dir: String },
}

/// Drives one host's SSH session: connect, upload via SFTP, invoke the
/// agent over `exec`, and stream its combined stdout/stderr back.
pub struct RusshTransport {
    conn: Connection,
    connect_timeout: Duration,
    output: Option<mpsc::Receiver<AgentOutput>>,
}

impl RusshTransport {
    pub fn new(user: String, host: String, port: u16, connect_timeout: Duration) -> Self {
        Self { conn: Connection::Pending { user, host, port }, connect_timeout, output: None }
    }
}

#[async_trait::async_trait]
impl AgentTransport for RusshTransport {
    async fn connect(&mut self) -> Result<(), ForgeError> {
        let (user, host, port) = match &self.conn {
            Connection::Pending { user, host, port } => (user.clone(), host.clone(), *port),
            Connection::Connected { .. } => return Ok(()),
        };
        let config = client_config(self.connect_timeout);
        let client = Client::connect_with_config(
            (host.as_str(), port),
            &user,
            AuthMethod::with_key_file_or_agent(),
            ServerCheckMethod::DefaultKnownHostsFile,
            config,
        )
        .await
        .map_err(|err| ForgeError::Connect(err.to_string()))?;

        let remote_dir = format!("/tmp/build-{}", uuid::Uuid::new_v4());
        self.conn = Connection::Connected { client, remote_dir };
        Ok(())
    }

    async fn prepare(&mut self, tarball_path: &Path) -> Result<(), ForgeError> {
        let (client, remote_dir) = match &self.conn {
            Connection::Connected { client, remote_dir } => (client, remote_dir.clone()),
            Connection::Pending { .. } => {
                return Err(ForgeError::Internal("prepare called before connect".to_string()));
            }
        };

        let mkdir_cmd = format!("mkdir -p {remote_dir}");
        client
            .execute(&mkdir_cmd)
            .await
            .map_err(|err| ForgeError::Transfer(format!("could not create remote directory: {err}")))?;

        let channel = client.get_channel().await.map_err(|err| ForgeError::Transfer(err.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|err| ForgeError::Transfer(format!("sftp subsystem request failed: {err}")))?;
        let sftp = russh_sftp::client::SftpSession::new(channel.into_stream())
            .await
            .map_err(|err| ForgeError::Transfer(format!("sftp session failed: {err}")))?;

        let tarball_name =
            tarball_path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
                ForgeError::Transfer("tarball path has no file name".to_string())
            })?;
        let tarball_bytes = tokio::fs::read(tarball_path)
            .await
            .map_err(|err| ForgeError::Transfer(format!("could not read local tarball: {err}")))?;
        upload(&sftp, &format!("{remote_dir}/{tarball_name}"), &tarball_bytes).await?;
        upload(&sftp, &format!("{remote_dir}/agent.sh"), AGENT_SCRIPT.as_bytes()).await?;

        client
            .execute(&format!("chmod +x {remote_dir}/agent.sh"))
            .await
            .map_err(|err| ForgeError::Transfer(format!("could not mark agent executable: {err}")))?;

        let (tx, rx) = mpsc::channel(256);
        self.output = Some(rx);

        let command = format!("{remote_dir}/agent.sh {remote_dir}/{tarball_name}");
        let mut exec_channel =
            client.get_channel().await.map_err(|err| ForgeError::Execute { status: -1, trailing: err.to_string() })?;
        exec_channel
            .exec(true, command)
            .await
            .map_err(|err| ForgeError::Execute { status: -1, trailing: err.to_string() })?;

        tokio::spawn(async move {
            let mut carry = String::new();
            loop {
                match exec_channel.wait().await {
                    Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                        if let Ok(text) = std::str::from_utf8(&data) {
                            carry.push_str(text);
                            while let Some(pos) = carry.find('\n') {
                                let line: String = carry.drain(..=pos).collect();
                                if tx.send(AgentOutput::Line(line.trim_end().to_string())).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        if !carry.is_empty() {
                            let _ = tx.send(AgentOutput::Line(std::mem::take(&mut carry))).await;
                        }
                        let _ = tx.send(AgentOutput::Exit(exit_status as i32)).await;
                        return;
                    }
                    Some(ChannelMsg::Eof) | None => return,
                    _ => {}
                }
            }
        });

        Ok(())
    }

    async fn next_output(&mut self) -> Result<Option<AgentOutput>, ForgeError> {
        match self.output.as_mut() {
            Some(rx) => Ok(rx.recv().await),
            None => Err(ForgeError::Internal("next_output called before prepare".to_string())),
        }
    }

    async fn cleanup(&mut self) {
        if let Connection::Connected { client, remote_dir } = &self.conn {
            let _ = client.execute(&format!("rm -rf {remote_dir}")).await;
        }
    }
}

async fn upload(
    sftp: &russh_sftp::client::SftpSession,
    remote_path: &str,
    bytes: &[u8],
) -> Result<(), ForgeError> {
    use russh_sftp::protocol::OpenFlags;
    use tokio::io::AsyncWriteExt;

    let mut file = sftp
        .open_with_flags(
            remote_path,
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
        )
        .await
        .map_err(|err| ForgeError::Transfer(format!("could not open {remote_path}: {err}")))?;
    file.write_all(bytes)
        .await
        .map_err(|err| ForgeError::Transfer(format!("could not write {remote_path}: {err}")))?;
    file.shutdown()
        .await
        .map_err(|err| ForgeError::Transfer(format!("could not finalize {remote_path}: {err}")))?;
    Ok(())
}

/// Suggested default path for the local tarball argument, used only by
/// the CLI's help text generation.
pub fn default_tarball_hint() -> PathBuf {
    PathBuf::from("source.tar.gz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_carries_the_requested_timeout() {
        let config = client_config(Duration::from_secs(30));
        assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(30)));
    }
}
