use std::io;
use std::sync::{Arc, Mutex};

use sqlx_any_conn_mgr::{Credentials, Database, DatabaseConfig};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
   fn contents(&self) -> String {
      String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
   }
}

impl io::Write for Captured {
   fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
   }

   fn flush(&mut self) -> io::Result<()> {
      Ok(())
   }
}

impl<'a> MakeWriter<'a> for Captured {
   type Writer = Captured;

   fn make_writer(&'a self) -> Self::Writer {
      self.clone()
   }
}

async fn connect(dir: &TempDir, name: &str, echo: bool) -> Database {
   Database::connect(
      &Credentials::sqlite(dir.path()),
      name,
      DatabaseConfig::default(),
      echo,
   )
   .await
   .expect("Failed to connect to test database")
}

// Statements may run on driver worker threads, so the subscriber has to be
// global. Keep this the only test in the file.
#[tokio::test]
async fn echo_logs_statements_only_when_enabled() {
   let captured = Captured::default();
   let subscriber = tracing_subscriber::fmt()
      .with_writer(captured.clone())
      .with_ansi(false)
      .finish();
   tracing::subscriber::set_global_default(subscriber).unwrap();

   let temp = TempDir::new().unwrap();

   let loud = connect(&temp, "loud", true).await;
   sqlx::query("SELECT 4242 AS echoed_marker")
      .fetch_one(loud.pool().unwrap())
      .await
      .unwrap();
   loud.close().await.unwrap();

   let quiet = connect(&temp, "quiet", false).await;
   sqlx::query("SELECT 777 AS silent_marker")
      .fetch_one(quiet.pool().unwrap())
      .await
      .unwrap();
   quiet.close().await.unwrap();

   let output = captured.contents();
   assert!(output.contains("sqlx::query"), "no statement log in: {output}");
   assert!(output.contains("echoed_marker"), "echoed statement missing: {output}");
   assert!(!output.contains("silent_marker"), "statement logged without echo: {output}");
}
