//! Console stand-in for the chat transport

use async_trait::async_trait;
use parley_agent::{Channel, Error, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prints replies to stdout and writes images into an outbox directory
pub struct ConsoleChannel {
    outbox: PathBuf,
    images: AtomicU64,
}

impl ConsoleChannel {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
            images: AtomicU64::new(0),
        }
    }

    fn image_path(&self, identity: &str) -> PathBuf {
        let n = self.images.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let who: String = identity
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.outbox.join(format!("{}-{}-{}.png", who, stamp, n))
    }
}

fn print_line(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)
        .and_then(|_| stdout.flush())
        .map_err(|e| Error::Channel(e.to_string()))
}

#[async_trait]
impl Channel for ConsoleChannel {
    async fn send_text(&self, identity: &str, text: &str) -> Result<()> {
        print_line(&format!("{} < {}", identity, text))
    }

    async fn send_image(&self, identity: &str, data: &[u8], caption: Option<&str>) -> Result<()> {
        tokio::fs::create_dir_all(&self.outbox)
            .await
            .map_err(|e| Error::Channel(format!("outbox {}: {}", self.outbox.display(), e)))?;

        let path = self.image_path(identity);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::Channel(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(identity, path = %path.display(), bytes = data.len(), "image written to outbox");
        match caption {
            Some(c) => print_line(&format!("{} < [image: {}] {}", identity, path.display(), c)),
            None => print_line(&format!("{} < [image: {}]", identity, path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_images_land_in_outbox() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let channel = ConsoleChannel::new(&outbox);

        channel.send_image("+1555@s.whatsapp.net", b"\x89PNG", None).await.unwrap();
        channel.send_image("+1555@s.whatsapp.net", b"second", Some("cap")).await.unwrap();

        let mut files: Vec<_> = std::fs::read_dir(&outbox)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        assert_eq!(files.len(), 2);
        for f in &files {
            let name = f.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("_1555_s_whatsapp_net-"));
            assert!(name.ends_with(".png"));
        }
        let contents: Vec<Vec<u8>> = files.iter().map(|f| std::fs::read(f).unwrap()).collect();
        assert!(contents.contains(&b"\x89PNG".to_vec()));
        assert!(contents.contains(&b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_send_text() {
        let channel = ConsoleChannel::new("unused");
        assert!(channel.send_text("alice", "hello").await.is_ok());
    }
}
