//! Zotero sink backed by the `zotero-cli` executable.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::process::Command;
use url::Url;

use super::{ReferenceSink, SinkError};
use crate::config::{expand_tilde, ZoteroConfig};
use crate::models::{Creator, LibraryItem, ReferenceItem};

/// Item types that hang off a parent item rather than standing alone
const CHILD_ITEM_TYPES: &[&str] = &["attachment", "note", "annotation"];

/// Adds items to a Zotero library through `zotero-cli`
#[derive(Debug, Clone)]
pub struct ZoteroCliSink {
    config: ZoteroConfig,
}

impl ZoteroCliSink {
    pub fn new(config: ZoteroConfig) -> Self {
        Self { config }
    }

    /// The executable plus the connection flags that are configured
    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.config.cli);
        let flags = [
            ("--api-key", self.config.api_key.as_deref()),
            ("--user-id", self.config.user_id.as_deref()),
            ("--group-id", self.config.group_id.as_deref()),
        ];
        for (flag, value) in flags {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                command.arg(flag).arg(value);
            }
        }
        if let Some(path) = &self.config.config {
            command.arg("--config").arg(expand_tilde(path));
        }
        command
    }

    async fn run(&self, args: &[&str], payload: Option<&Path>) -> Result<String, SinkError> {
        let mut command = self.base_command();
        command.args(args);
        if let Some(path) = payload {
            command.arg(path);
        }

        tracing::info!("Running command: {} {}", self.config.cli, args.join(" "));
        let output = command.output().await.map_err(|source| SinkError::Spawn {
            program: self.config.cli.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SinkError::CommandFailed {
                program: self.config.cli.clone(),
                message: if stderr.is_empty() { stdout } else { stderr },
            });
        }
        Ok(stdout)
    }

    /// Submit one payload as a single-element JSON array via `create-item`
    async fn create_item(&self, payload: &Value) -> Result<String, SinkError> {
        let file = write_payload(&[payload])?;
        self.run(&["create-item"], Some(file.path())).await
    }

    async fn resolve_collection_key(&self, name: &str) -> Result<Option<String>, SinkError> {
        let output = self.run(&["collections"], None).await?;
        match find_collection_key(&output, name) {
            Ok(Some(key)) => Ok(Some(key)),
            Ok(None) => {
                tracing::warn!("Collection '{}' not found in Zotero library", name);
                Ok(None)
            }
            Err(_) => {
                tracing::warn!("Could not decode collections output; skipping collection assignment");
                Ok(None)
            }
        }
    }

    fn unexpected_output(&self, message: impl ToString) -> SinkError {
        SinkError::UnexpectedOutput {
            program: self.config.cli.clone(),
            message: message.to_string(),
        }
    }
}

fn write_payload<T: serde::Serialize + ?Sized>(payload: &T) -> Result<NamedTempFile, SinkError> {
    let mut file = tempfile::Builder::new()
        .prefix("zotero-item-")
        .suffix(".json")
        .tempfile()?;
    serde_json::to_writer(&mut file, payload)?;
    file.flush()?;
    Ok(file)
}

#[async_trait]
impl ReferenceSink for ZoteroCliSink {
    fn name(&self) -> &str {
        "Zotero"
    }

    async fn add_paper(
        &self,
        item: &ReferenceItem,
        pdf_path: Option<&Path>,
    ) -> Result<Option<String>, SinkError> {
        let collection_key = match item.collection.as_deref().filter(|c| !c.is_empty()) {
            Some(name) => self.resolve_collection_key(name).await?,
            None => None,
        };

        let payload = item_payload(item, collection_key.as_deref());
        let output = self.create_item(&payload).await?;

        let Some(item_key) = extract_item_key(&output) else {
            tracing::error!("Failed to parse created Zotero item key");
            return Ok(None);
        };
        tracing::info!("Created Zotero item with key {}", item_key);

        if let Some(path) = pdf_path {
            match self.link_pdf(&item_key, &item.title, path).await {
                Ok(()) => tracing::info!("Attached PDF to item {}", item_key),
                Err(e) => tracing::warn!("Failed to attach PDF to {}: {}", item_key, e),
            }
        }

        Ok(Some(item_key))
    }

    async fn list_items(&self, collection: Option<&str>) -> Result<Vec<LibraryItem>, SinkError> {
        let output = match collection.filter(|c| !c.is_empty()) {
            Some(name) => {
                let key = self
                    .resolve_collection_key(name)
                    .await?
                    .ok_or_else(|| SinkError::CollectionNotFound(name.to_string()))?;
                self.run(&["items", "--top", "--collection", key.as_str()], None)
                    .await?
            }
            None => self.run(&["items", "--top"], None).await?,
        };

        parse_library_items(&output).map_err(|e| self.unexpected_output(e))
    }

    async fn link_pdf(
        &self,
        item_key: &str,
        title: &str,
        pdf_path: &Path,
    ) -> Result<(), SinkError> {
        let uri = pdf_path
            .canonicalize()
            .ok()
            .and_then(|p| Url::from_file_path(p).ok())
            .ok_or_else(|| SinkError::MissingFile(pdf_path.to_path_buf()))?;

        let payload = attachment_payload(item_key, title, uri.as_str());
        self.create_item(&payload).await?;
        Ok(())
    }

    async fn update_authors(&self, item_key: &str, authors: &[String]) -> Result<(), SinkError> {
        let file = write_payload(&json!({ "creators": author_creators(authors) }))?;
        self.run(&["update-item", "--key", item_key], Some(file.path()))
            .await?;
        Ok(())
    }
}

/// Zotero creators for display names, blank names dropped
pub fn author_creators(authors: &[String]) -> Vec<Creator> {
    authors
        .iter()
        .filter_map(|author| Creator::author(author))
        .collect()
}

/// The `journalArticle` payload for an item
pub fn item_payload(item: &ReferenceItem, collection_key: Option<&str>) -> Value {
    let mut payload = json!({
        "itemType": "journalArticle",
        "title": item.title,
        "creators": author_creators(&item.authors),
        "abstractNote": item.snippet,
        "DOI": item.doi.as_deref().unwrap_or_default(),
        "url": item.url,
        "date": item.year.map(|y| y.to_string()).unwrap_or_default(),
        "extra": item.extra(),
    });
    if let Some(key) = collection_key {
        payload["collections"] = json!([key]);
    }
    payload
}

/// A `linked_file` attachment pointing at a local PDF
pub fn attachment_payload(parent_key: &str, title: &str, file_uri: &str) -> Value {
    let title = if title.is_empty() { "paper" } else { title };
    json!({
        "itemType": "attachment",
        "parentItem": parent_key,
        "linkMode": "linked_file",
        "title": format!("PDF - {}", title),
        "path": file_uri,
        "contentType": "application/pdf",
    })
}

/// Item key from `create-item` output.
///
/// Accepts the write-response shape (`{"successful": {"0": {"key": ..}}}`)
/// and a bare list of created items.
pub fn extract_item_key(output: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(output).ok()?;

    if let Some(successful) = payload.get("successful").and_then(Value::as_object) {
        let key = successful
            .values()
            .find_map(|entry| entry.get("key").and_then(Value::as_str))
            .filter(|key| !key.is_empty());
        if let Some(key) = key {
            return Some(key.to_string());
        }
    }

    payload
        .as_array()
        .and_then(|items| items.first())
        .and_then(|first| first.get("key"))
        .and_then(Value::as_str)
        .map(String::from)
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    data: ApiItemData,
    #[serde(default)]
    links: ApiLinks,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItemData {
    key: String,
    #[serde(default)]
    item_type: String,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "DOI")]
    doi: String,
    #[serde(default)]
    creators: Vec<Creator>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiLinks {
    attachment: Option<ApiAttachmentLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttachmentLink {
    #[serde(default)]
    attachment_type: String,
}

/// Top-level items from `items` output.
///
/// Attachments and notes are skipped. An item counts as having a PDF when
/// its best attachment link is a PDF.
pub fn parse_library_items(output: &str) -> Result<Vec<LibraryItem>, serde_json::Error> {
    let items: Vec<ApiItem> = serde_json::from_str(output)?;
    Ok(items
        .into_iter()
        .filter(|item| !CHILD_ITEM_TYPES.contains(&item.data.item_type.as_str()))
        .map(|item| LibraryItem {
            has_pdf: item
                .links
                .attachment
                .is_some_and(|link| link.attachment_type == "application/pdf"),
            key: item.data.key,
            title: item.data.title,
            doi: Some(item.data.doi).filter(|doi| !doi.trim().is_empty()),
            creators: item.data.creators,
        })
        .collect())
}

/// Key of the collection named `name` in `collections` output
pub fn find_collection_key(output: &str, name: &str) -> Result<Option<String>, serde_json::Error> {
    let collections: Vec<Value> = serde_json::from_str(output)?;
    Ok(collections.iter().find_map(|collection| {
        let data = collection.get("data")?;
        if data.get("name").and_then(Value::as_str) == Some(name) {
            data.get("key").and_then(Value::as_str).map(String::from)
        } else {
            None
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SearchResult, SearchResultBuilder, SourceTag};

    fn item() -> ReferenceItem {
        let result = SearchResultBuilder::new("Attention Is All You Need")
            .authors(["Ashish Vaswani", "Noam", "  ", "Aidan N. Gomez"])
            .year(Some(2017))
            .doi(Some("10.5555/3295222.3295349".to_string()))
            .url("https://papers.nips.cc/paper/7181")
            .snippet("The dominant sequence transduction models")
            .build();
        ReferenceItem::from_result(&result)
    }

    #[test]
    fn test_author_creators() {
        let creators = author_creators(&item().authors);
        assert_eq!(creators.len(), 3);
        assert_eq!(creators[0].first_name.as_deref(), Some("Ashish"));
        assert_eq!(creators[0].last_name.as_deref(), Some("Vaswani"));
        assert_eq!(creators[1].name.as_deref(), Some("Noam"));
        assert!(creators[1].last_name.is_none());
        assert_eq!(creators[2].first_name.as_deref(), Some("Aidan N."));
        assert_eq!(creators[2].last_name.as_deref(), Some("Gomez"));

        let payload = item_payload(&item(), None);
        assert_eq!(payload["creators"][0]["creatorType"], "author");
        assert_eq!(payload["creators"][1], json!({"creatorType": "author", "name": "Noam"}));
    }

    #[test]
    fn test_parse_library_items() {
        let output = r#"[
            {"key": "AAA", "data": {"key": "AAA", "itemType": "journalArticle", "title": "With PDF",
              "DOI": "10.1234/abc", "creators": [{"creatorType": "author", "firstName": "Z", "lastName": "Wu"}]},
             "links": {"attachment": {"href": "x", "attachmentType": "application/pdf"}}},
            {"key": "BBB", "data": {"key": "BBB", "itemType": "journalArticle", "title": "Bare", "DOI": " "}},
            {"key": "CCC", "data": {"key": "CCC", "itemType": "attachment", "title": "PDF - x"}},
            {"key": "DDD", "data": {"key": "DDD", "itemType": "book", "title": "Snapshot only"},
             "links": {"attachment": {"attachmentType": "text/html"}}}
        ]"#;

        let items = parse_library_items(output).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].key, "AAA");
        assert_eq!(items[0].doi.as_deref(), Some("10.1234/abc"));
        assert!(items[0].has_pdf);
        assert!(items[0].has_valid_authors());
        assert_eq!(items[1].doi, None);
        assert!(!items[1].has_pdf);
        assert!(items[1].creators.is_empty());
        assert!(!items[2].has_pdf);

        assert!(parse_library_items("{}").is_err());
    }

    #[test]
    fn test_item_payload() {
        let item = item().pdf_source(Some(SourceTag::Mirror));
        let payload = item_payload(&item, Some("COLL1"));

        assert_eq!(payload["itemType"], "journalArticle");
        assert_eq!(payload["title"], "Attention Is All You Need");
        assert_eq!(payload["abstractNote"], "The dominant sequence transduction models");
        assert_eq!(payload["DOI"], "10.5555/3295222.3295349");
        assert_eq!(payload["date"], "2017");
        assert_eq!(payload["extra"], "PDF source: mirror");
        assert_eq!(payload["collections"], json!(["COLL1"]));

        let bare = item_payload(&ReferenceItem::from_result(&SearchResult::new("")), None);
        assert_eq!(bare["date"], "");
        assert_eq!(bare["DOI"], "");
        assert!(bare.get("collections").is_none());
    }

    #[test]
    fn test_extract_item_key() {
        assert_eq!(
            extract_item_key(r#"{"successful": {"0": {"key": "ABCD1234"}}, "failed": {}}"#)
                .as_deref(),
            Some("ABCD1234")
        );
        assert_eq!(
            extract_item_key(r#"[{"key": "LIST0001"}]"#).as_deref(),
            Some("LIST0001")
        );
        assert_eq!(extract_item_key(r#"{"successful": {}}"#), None);
        assert_eq!(extract_item_key("created!"), None);
    }

    #[test]
    fn test_find_collection_key() {
        let output = r#"[
            {"data": {"key": "AAA", "name": "Archive"}},
            {"data": {"key": "BBB", "name": "Reading"}}
        ]"#;
        assert_eq!(
            find_collection_key(output, "Reading").unwrap().as_deref(),
            Some("BBB")
        );
        assert_eq!(find_collection_key(output, "Missing").unwrap(), None);
        assert!(find_collection_key("not json", "Reading").is_err());
    }

    #[test]
    fn test_attachment_payload() {
        let payload = attachment_payload("ITEM1", "", "file:///tmp/a.pdf");
        assert_eq!(payload["parentItem"], "ITEM1");
        assert_eq!(payload["linkMode"], "linked_file");
        assert_eq!(payload["title"], "PDF - paper");
        assert_eq!(payload["contentType"], "application/pdf");
    }

    #[cfg(unix)]
    mod cli {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// A stand-in `zotero-cli` that logs its arguments and payloads
        fn fake_cli(dir: &TempDir) -> std::path::PathBuf {
            let script = dir.path().join("zotero-cli");
            let body = format!(
                r#"#!/bin/sh
echo "$@" >> "{dir}/args.log"
for last; do :; done
case "$*" in
  *collections*) echo '[{{"data":{{"key":"COLL1","name":"Reading"}}}}]' ;;
  *create-item*) {{ cat "$last"; echo; }} >> "{dir}/payloads.log"; echo '{{"successful":{{"0":{{"key":"ITEM1"}}}}}}' ;;
  *update-item*) {{ cat "$last"; echo; }} >> "{dir}/payloads.log" ;;
  *items*) echo '[{{"key":"ITEM1","data":{{"key":"ITEM1","itemType":"journalArticle","title":"Stored","DOI":"10.1234/abc","creators":[]}}}}]' ;;
esac
"#,
                dir = dir.path().display()
            );
            std::fs::write(&script, body).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        fn sink(dir: &TempDir) -> ZoteroCliSink {
            ZoteroCliSink::new(ZoteroConfig {
                cli: fake_cli(dir).display().to_string(),
                api_key: Some("secret".to_string()),
                user_id: Some("42".to_string()),
                ..Default::default()
            })
        }

        fn payloads(dir: &TempDir) -> Vec<Value> {
            std::fs::read_to_string(dir.path().join("payloads.log"))
                .unwrap()
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }

        #[tokio::test]
        async fn test_add_paper_with_collection_and_pdf() {
            let dir = tempfile::tempdir().unwrap();
            let pdf = dir.path().join("paper.pdf");
            std::fs::write(&pdf, b"%PDF-1.4").unwrap();

            let item = item().collection(Some("Reading".to_string()));
            let key = sink(&dir).add_paper(&item, Some(&pdf)).await.unwrap();
            assert_eq!(key.as_deref(), Some("ITEM1"));

            let args = std::fs::read_to_string(dir.path().join("args.log")).unwrap();
            let lines: Vec<_> = args.lines().collect();
            assert_eq!(lines.len(), 3);
            assert!(lines[0].starts_with("--api-key secret --user-id 42 collections"));
            assert!(lines[1].contains("create-item"));

            let payloads = payloads(&dir);
            assert_eq!(payloads.len(), 2);
            assert_eq!(payloads[0][0]["collections"], json!(["COLL1"]));
            assert_eq!(payloads[1][0]["parentItem"], "ITEM1");
            assert!(payloads[1][0]["path"]
                .as_str()
                .unwrap()
                .starts_with("file:///"));
        }

        #[tokio::test]
        async fn test_unknown_collection_and_missing_pdf() {
            let dir = tempfile::tempdir().unwrap();
            let item = item().collection(Some("Elsewhere".to_string()));

            let key = sink(&dir)
                .add_paper(&item, Some(&dir.path().join("gone.pdf")))
                .await
                .unwrap();
            assert_eq!(key.as_deref(), Some("ITEM1"));

            let payloads = payloads(&dir);
            assert_eq!(payloads.len(), 1);
            assert!(payloads[0][0].get("collections").is_none());
        }

        #[tokio::test]
        async fn test_list_items_in_collection() {
            let dir = tempfile::tempdir().unwrap();
            let items = sink(&dir).list_items(Some("Reading")).await.unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].key, "ITEM1");
            assert_eq!(items[0].doi.as_deref(), Some("10.1234/abc"));

            let args = std::fs::read_to_string(dir.path().join("args.log")).unwrap();
            let lines: Vec<_> = args.lines().collect();
            assert_eq!(lines.len(), 2);
            assert!(lines[1].ends_with("items --top --collection COLL1"));

            let missing = sink(&dir).list_items(Some("Elsewhere")).await;
            assert!(matches!(missing, Err(SinkError::CollectionNotFound(_))));
        }

        #[tokio::test]
        async fn test_update_authors_and_link_pdf() {
            let dir = tempfile::tempdir().unwrap();
            let sink = sink(&dir);
            sink.update_authors("ITEM1", &["Zonghan Wu".to_string(), "Pan".to_string()])
                .await
                .unwrap();

            let missing = sink
                .link_pdf("ITEM1", "Stored", &dir.path().join("gone.pdf"))
                .await;
            assert!(matches!(missing, Err(SinkError::MissingFile(_))));

            let pdf = dir.path().join("stored.pdf");
            std::fs::write(&pdf, b"%PDF-1.4").unwrap();
            sink.link_pdf("ITEM1", "Stored", &pdf).await.unwrap();

            let args = std::fs::read_to_string(dir.path().join("args.log")).unwrap();
            assert!(args.lines().next().unwrap().contains("update-item --key ITEM1"));

            let payloads = payloads(&dir);
            assert_eq!(payloads.len(), 2);
            assert_eq!(payloads[0]["creators"][0]["lastName"], "Wu");
            assert_eq!(payloads[0]["creators"][1]["name"], "Pan");
            assert_eq!(payloads[1][0]["linkMode"], "linked_file");
            assert_eq!(payloads[1][0]["parentItem"], "ITEM1");
        }

        #[tokio::test]
        async fn test_missing_executable_is_spawn_error() {
            let sink = ZoteroCliSink::new(ZoteroConfig {
                cli: "/nonexistent/zotero-cli".to_string(),
                ..Default::default()
            });
            let result = sink.add_paper(&item(), None).await;
            assert!(matches!(result, Err(SinkError::Spawn { .. })));
        }
    }
}
