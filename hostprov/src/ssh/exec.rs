use std::future::Future;
use std::io;

use russh::client::Handle;
use russh::ChannelMsg;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::script::Script;
use crate::ssh::session::ClientHandler;
use crate::ssh::{ExecFailure, REMOTE_COMMAND};

#[derive(Debug, Default)]
struct ChannelEnd {
    exit_status: Option<u32>,
    exit_signal: Option<String>,
    refused: bool,
}

impl ChannelEnd {
    fn into_result(self) -> Result<(), ExecFailure> {
        if self.refused {
            return Err(ExecFailure::Session(format!(
                "remote refused to start `{}`",
                REMOTE_COMMAND
            )));
        }
        if let Some(signal) = self.exit_signal {
            return Err(ExecFailure::ScriptExecution(format!(
                "remote shell terminated by signal {}",
                signal
            )));
        }
        match self.exit_status {
            Some(0) => Ok(()),
            Some(code) => Err(ExecFailure::ScriptExecution(format!(
                "remote shell exited with status {}",
                code
            ))),
            None => Err(ExecFailure::ScriptExecution(
                "channel closed before the remote shell reported an exit status".to_string(),
            )),
        }
    }
}

// Returns true once the channel is finished.
fn handle_capture_message(msg: &ChannelMsg, out: &mut Vec<u8>, end: &mut ChannelEnd) -> bool {
    match msg {
        ChannelMsg::Data { data } => {
            out.extend_from_slice(data);
            false
        }
        ChannelMsg::ExtendedData { data, ext: 1 } => {
            out.extend_from_slice(data);
            false
        }
        ChannelMsg::ExitStatus { exit_status } => {
            end.exit_status = Some(*exit_status);
            false
        }
        ChannelMsg::ExitSignal { signal_name, .. } => {
            end.exit_signal = Some(format!("{:?}", signal_name));
            false
        }
        ChannelMsg::Failure => {
            end.refused = true;
            true
        }
        ChannelMsg::Close => true,
        _ => false,
    }
}

/// Write `input` to `writer` and shut it down while `receive` runs.
///
/// Returns once `receive` finishes. The write result is `None` when input
/// was still unsent at that point; the rest is abandoned.
async fn feed_while_receiving<W, F>(writer: W, input: &[u8], receive: F) -> Option<io::Result<()>>
where
    W: AsyncWrite,
    F: Future<Output = ()>,
{
    let mut writer = Box::pin(writer);
    let send = async move {
        writer.write_all(input).await?;
        // For a channel writer this sends EOF
        writer.shutdown().await
    };
    tokio::pin!(send);
    tokio::pin!(receive);

    let mut sent = None;
    loop {
        tokio::select! {
            result = &mut send, if sent.is_none() => sent = Some(result),
            () = &mut receive => return sent,
        }
    }
}

/// Open one session channel on `handle`, pipe `script` into `sh -s` and
/// collect combined output into `output` until the channel closes.
///
/// The script is written while output is read, so a remote shell blocked on
/// a full output window still lets the rest of the script through.
pub(super) async fn run_on(
    handle: &Handle<ClientHandler>,
    script: &Script,
    output: &mut Vec<u8>,
) -> Result<(), ExecFailure> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ExecFailure::Session(format!("could not open session channel: {}", e)))?;

    channel
        .exec(true, REMOTE_COMMAND)
        .await
        .map_err(|e| ExecFailure::Session(format!("exec request failed: {}", e)))?;

    let writer = channel.make_writer();
    let mut end = ChannelEnd::default();
    let receive = async {
        while let Some(msg) = channel.wait().await {
            if handle_capture_message(&msg, output, &mut end) {
                break;
            }
        }
    };
    let sent = feed_while_receiving(writer, script.as_str().as_bytes(), receive).await;
    debug!("remote shell finished: {:?}", end);

    if let Err(e) = channel.close().await {
        debug!("closing session channel failed: {}", e);
    }

    match (end.into_result(), sent) {
        (Ok(()), Some(Err(e))) => Err(ExecFailure::ScriptExecution(format!(
            "failed to send script: {}",
            e
        ))),
        (result, _) => result,
    }
}
