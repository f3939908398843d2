//! Subversion tree source.
//!
//! Drives the `svn` command-line client: `svn list --xml <url>` for
//! listings and `svn cat <url>` for contents. Authentication is whatever
//! the client's own configuration provides.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::process::Command;

use crate::models::{EntryKind, TreeEntry};
use crate::tree::RemoteTree;

#[derive(Debug, Clone)]
pub struct SvnTree {
    binary: String,
}

impl SvnTree {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>> {
        let output = Command::new(&self.binary)
            .arg("--non-interactive")
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary))?;
        if !output.status.success() {
            bail!(
                "{} {} exited with {}: {}",
                self.binary,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl RemoteTree for SvnTree {
    fn kind(&self) -> &str {
        "svn"
    }

    async fn list(&self, path: &str) -> Result<Vec<TreeEntry>> {
        let xml = self.run(&list_args(path)).await?;
        parse_list(path, &xml)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        self.run(&cat_args(path)).await
    }
}

/// Target with an explicit empty peg revision. Without it svn reads the
/// last `@` of a name such as `icon@2x.png` as a peg revision.
fn peg_target(path: &str) -> String {
    format!("{}@", path)
}

fn list_args(path: &str) -> Vec<String> {
    vec!["list".to_string(), "--xml".to_string(), peg_target(path)]
}

fn cat_args(path: &str) -> Vec<String> {
    vec!["cat".to_string(), peg_target(path)]
}

/// Parse `svn list --xml` output into entries of `parent`.
fn parse_list(parent: &str, xml: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut entries = Vec::new();
    let mut kind: Option<EntryKind> = None;
    let mut in_name = false;
    let mut name = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => {
                    name.clear();
                    kind = None;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"kind" {
                            kind = match attr.value.as_ref() {
                                b"file" => Some(EntryKind::File),
                                b"dir" => Some(EntryKind::Directory),
                                _ => None,
                            };
                        }
                    }
                }
                b"name" => in_name = true,
                _ => {}
            },
            Event::Text(t) if in_name => {
                name.push_str(&t.unescape().unwrap_or_default());
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"name" => in_name = false,
                b"entry" => {
                    let kind = kind
                        .take()
                        .ok_or_else(|| anyhow!("svn list entry {:?} has no known kind", name))?;
                    entries.push(TreeEntry::child(parent, &name, kind));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}
