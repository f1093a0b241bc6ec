use crate::channel::{qualify, COMMAND};
use crate::client::VbanCmd;
use crate::error::Result;

/// Global actions on the remote application
#[derive(Clone, Copy)]
pub struct Command<'a> {
    remote: &'a VbanCmd,
}

impl<'a> Command<'a> {
    pub(crate) fn new(remote: &'a VbanCmd) -> Self {
        Self { remote }
    }

    async fn action(&self, param: &str, value: bool) -> Result<()> {
        self.remote.write(&qualify(COMMAND, param), value).await
    }

    /// Bring the main window to the front
    pub async fn show(&self) -> Result<()> {
        self.action("show", true).await
    }

    pub async fn hide(&self) -> Result<()> {
        self.action("show", false).await
    }

    /// Close the remote application
    pub async fn shutdown(&self) -> Result<()> {
        self.action("shutdown", true).await
    }

    /// Restart the audio engine
    pub async fn restart(&self) -> Result<()> {
        self.action("restart", true).await
    }

    pub async fn set_lock(&self, lock: bool) -> Result<()> {
        self.action("lock", lock).await
    }

    pub async fn set_showvbanchat(&self, show: bool) -> Result<()> {
        self.action("DialogShow.VBANCHAT", show).await
    }
}
