use crate::{backend::SessionPtr, error::Result, Error};

/// State shared by both façades: either nothing yet, or a live session
/// together with the resource path it was resolved for.
pub(crate) enum Connection {
    Unconnected,
    Connected {
        session: SessionPtr,
        path: String,
    },
}

impl Connection {
    pub(crate) fn get(&self) -> Result<(&SessionPtr, &str)> {
        match self {
            Connection::Connected { session, path } => Ok((session, path)),
            Connection::Unconnected => Err(Error::NotConnected),
        }
    }

    pub(crate) fn path(&self) -> Option<&str> {
        self.get().ok().map(|(_, path)| path)
    }

    pub(crate) fn is_connected(&self) -> bool {
        matches!(self, Connection::Connected { .. })
    }

    /// Points an existing session at a new path.
    pub(crate) fn rebind(&mut self, new_path: String) -> Result<()> {
        match self {
            Connection::Connected { path, .. } => {
                *path = new_path;
                Ok(())
            }
            Connection::Unconnected => Err(Error::NotConnected),
        }
    }
}
