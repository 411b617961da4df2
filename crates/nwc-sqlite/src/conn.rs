//! A dedicated OS thread owning the `rusqlite::Connection`, reached over a
//! channel. `rusqlite::Connection` is `!Send` across awaits in practice (it
//! is not `Sync`, and holding it across an `.await` would serialize every
//! caller on a single mutex anyway), so every query is a closure shipped to
//! the owning thread and run to completion before the next one starts —
//! the same shape as `cdk-sqlite`'s `AsyncRusqlite`, without its statement
//! builder or connection pool: one connection is enough for the write
//! volume a wallet-connect provider sees.

use std::sync::mpsc as std_mpsc;
use std::thread;

use rusqlite::Connection;
use tokio::sync::oneshot;

use crate::Error;

type Job = Box<dyn FnOnce(&Connection) -> Result<BoxedValue, Error> + Send>;
type BoxedValue = Box<dyn std::any::Any + Send>;

struct Request {
    job: Job,
    reply: oneshot::Sender<Result<BoxedValue, Error>>,
}

/// A handle to the connection-owning thread.
#[derive(Debug, Clone)]
pub struct Handle {
    sender: std_mpsc::Sender<Request>,
}

impl Handle {
    /// Open `path` (or `:memory:`) and spawn the owning thread, applying the
    /// same pragmas `cdk-sqlite::common::create_sqlite_pool` does.
    pub fn open(path: &str) -> Result<Self, Error> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| Error::Sqlite(e.to_string()))?;

        conn.pragma_update(None, "journal_mode", "wal").map_err(|e| Error::Sqlite(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "normal").map_err(|e| Error::Sqlite(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "on").map_err(|e| Error::Sqlite(e.to_string()))?;

        let (sender, receiver) = std_mpsc::channel::<Request>();
        thread::Builder::new()
            .name("nwc-sqlite".into())
            .spawn(move || {
                for request in receiver {
                    let result = (request.job)(&conn);
                    let _ = request.reply.send(result);
                }
            })
            .map_err(|e| Error::Sqlite(e.to_string()))?;

        Ok(Self { sender })
    }

    /// Run `f` against the connection on its owning thread and await the
    /// typed result.
    pub async fn with<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&Connection) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| f(conn).map(|r| Box::new(r) as BoxedValue));
        self.sender
            .send(Request { job, reply: reply_tx })
            .map_err(|_| Error::Sqlite("database thread gone".into()))?;
        let boxed = reply_rx.await.map_err(|_| Error::Sqlite("database thread dropped reply".into()))??;
        Ok(*boxed
            .downcast::<R>()
            .expect("Handle::with result type must match the closure's return type"))
    }
}
