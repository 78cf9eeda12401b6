use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use calamine::Reader;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::types::{ContextItem, DocId, SourceType};
use super::DocumentStore;

/// Word-window chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap: usize,
}

pub const UPLOAD_CHUNKING: ChunkingConfig = ChunkingConfig {
    max_tokens: 500,
    overlap: 60,
};

pub const SPECIES_CHUNKING: ChunkingConfig = ChunkingConfig {
    max_tokens: 400,
    overlap: 40,
};

pub const WEB_CHUNKING: ChunkingConfig = ChunkingConfig {
    max_tokens: 350,
    overlap: 40,
};

/// What one ingested document produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub doc_id: DocId,
    pub name: String,
    pub chunks: usize,
    /// The document was already stored and nothing was written.
    pub already_present: bool,
}

/// Split text into windows of `max_tokens` whitespace words, carrying
/// `overlap` words from the end of one window into the next.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || config.max_tokens == 0 {
        return vec![];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + config.max_tokens).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        // Always advance, even when overlap >= max_tokens.
        start = end.saturating_sub(config.overlap).max(start + 1);
    }
    chunks
}

/// Extract plain text from an uploaded file.
pub fn extract_text(data: &[u8], filename: &str, mime_type: Option<&str>) -> Result<String> {
    let lowered = filename.to_lowercase();
    let mime = mime_type.unwrap_or("");

    if lowered.ends_with(".pdf") || mime == "application/pdf" {
        return extract_pdf(data, filename);
    }
    if lowered.ends_with(".xlsx") || lowered.ends_with(".xls") || lowered.ends_with(".ods") {
        return extract_spreadsheet(data, filename);
    }
    if lowered.ends_with(".html") || lowered.ends_with(".htm") || mime.contains("html") {
        return Ok(html2text::from_read(data, 120)
            .unwrap_or_else(|_| String::from_utf8_lossy(data).to_string()));
    }
    Ok(String::from_utf8_lossy(data).to_string())
}

fn extract_pdf(data: &[u8], filename: &str) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| anyhow!("Failed to extract PDF text from {}: {}", filename, e))?;
    // pdf-extract separates pages with form feeds
    Ok(text.replace('\x0c', "\n"))
}

/// One `Sheet: <name>` block of comma-separated rows per worksheet.
fn extract_spreadsheet(data: &[u8], filename: &str) -> Result<String> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(data))
        .map_err(|e| anyhow!("Failed to open spreadsheet {}: {}", filename, e))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut blocks = Vec::with_capacity(sheet_names.len());
    for name in &sheet_names {
        match workbook.worksheet_range(name) {
            Ok(range) => blocks.push(sheet_block(
                name,
                range
                    .rows()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect()),
            )),
            Err(e) => warn!(sheet = %name, "Skipping unreadable sheet in {}: {}", filename, e),
        }
    }
    Ok(blocks.join("\n"))
}

fn sheet_block(name: &str, rows: impl IntoIterator<Item = Vec<String>>) -> String {
    let mut block = format!("Sheet: {}\n", name);
    for row in rows {
        let line: Vec<String> = row.iter().map(|cell| csv_field(cell)).collect();
        block.push_str(&line.join(","));
        block.push('\n');
    }
    block
}

fn csv_field(cell: &str) -> String {
    if cell.contains([',', '"', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Build one context item per chunk of a document.
pub fn chunk_items(
    doc_id: &str,
    name: &str,
    text: &str,
    project_id: Option<&str>,
    source: SourceType,
    config: ChunkingConfig,
) -> Vec<ContextItem> {
    let chunks = chunk_text(text, config);
    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, content)| ContextItem {
            id: format!("{}:{}", doc_id, idx),
            item_id: Some(doc_id.to_string()),
            name: if total > 1 {
                format!("{} (part {}/{})", name, idx + 1, total)
            } else {
                name.to_string()
            },
            source: source.as_str().to_string(),
            project_id: project_id.map(str::to_string),
            content: Some(content),
        })
        .collect()
}

/// Store a content-addressed document unless its first chunk is already present.
async fn store_document(
    store: &DocumentStore,
    doc_id: DocId,
    name: String,
    items: Vec<ContextItem>,
) -> Result<Ingested> {
    let Some(first) = items.first() else {
        bail!("{} contains no text to ingest", name);
    };
    if store
        .get_item(first.project_id.as_deref(), &first.id)
        .await?
        .is_some()
    {
        debug!(doc_id = %doc_id, "document already ingested, skipping");
        return Ok(Ingested {
            doc_id,
            name,
            chunks: items.len(),
            already_present: true,
        });
    }

    store.put_items(&items).await?;
    Ok(Ingested {
        doc_id,
        name,
        chunks: items.len(),
        already_present: false,
    })
}

/// Ingest a file from disk into the context store.
pub async fn ingest_file(
    store: &DocumentStore,
    path: &Path,
    project_id: Option<&str>,
    source: SourceType,
) -> Result<Ingested> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "uploaded_file".to_string());

    let text = extract_text(&data, &name, None)?;
    let doc_id = blake3::hash(&data).to_hex().to_string();
    let items = chunk_items(&doc_id, &name, &text, project_id, source, UPLOAD_CHUNKING);
    let ingested = store_document(store, doc_id, name, items).await?;

    info!(
        doc_id = %ingested.doc_id,
        chunks = ingested.chunks,
        size = data.len(),
        source = %source,
        project_id = project_id.unwrap_or("global"),
        already_present = ingested.already_present,
        "document ingested"
    );
    Ok(ingested)
}

/// Web material belongs to the knowledge base unless it is filed under a project.
fn web_source(project_id: Option<&str>) -> SourceType {
    match project_id {
        Some(_) => SourceType::Upload,
        None => SourceType::GlobalKb,
    }
}

fn url_name(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|tail| !tail.is_empty())
        .unwrap_or(url)
}

/// Fetch a web page and ingest its text.
pub async fn ingest_url(
    store: &DocumentStore,
    url: &str,
    project_id: Option<&str>,
) -> Result<Ingested> {
    let resp = reqwest::get(url)
        .await
        .context("Failed to fetch URL")?
        .error_for_status()
        .with_context(|| format!("Fetching {} failed", url))?;

    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = resp.bytes().await.context("Failed to read response body")?;
    let name = url_name(url).to_string();
    let text = extract_text(&body, &name, Some(&content_type))?;

    let doc_id = blake3::hash(&body).to_hex().to_string();
    let source = web_source(project_id);
    let items = chunk_items(&doc_id, &name, &text, project_id, source, WEB_CHUNKING);
    let ingested = store_document(store, doc_id, name, items).await?;

    info!(
        doc_id = %ingested.doc_id,
        chunks = ingested.chunks,
        size = body.len(),
        url,
        already_present = ingested.already_present,
        "URL ingested"
    );
    Ok(ingested)
}

/// A JSON input file holds either one record or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

async fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: OneOrMany<T> = serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(match records {
        OneOrMany::Many(records) => records,
        OneOrMany::One(record) => vec![record],
    })
}

/// A canonical species row.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpeciesRecord {
    #[serde(default)]
    pub id: String,
    pub genus: Option<String>,
    pub species: Option<String>,
    pub code: Option<String>,
    pub common_name: Option<String>,
    pub family: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SpeciesRecord {
    pub fn title(&self) -> String {
        if let Some(common) = self.common_name.as_deref().filter(|c| !c.is_empty()) {
            return common.to_string();
        }
        let binomial: Vec<&str> = [self.genus.as_deref(), self.species.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect();
        if binomial.is_empty() {
            self.id.clone()
        } else {
            binomial.join(" ")
        }
    }

    /// Labelled profile text, one line per known field.
    pub fn profile_text(&self) -> String {
        let fields = [
            ("Genus", self.genus.as_deref()),
            ("Species", self.species.as_deref()),
            ("Code", self.code.as_deref()),
            ("Common name", self.common_name.as_deref()),
            ("Family", self.family.as_deref()),
            ("Class", self.class_name.as_deref()),
        ];
        let mut lines = vec!["Species Profile".to_string()];
        lines.extend(fields.into_iter().filter_map(|(label, value)| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}: {}", label, v))
        }));
        if !self.tags.is_empty() {
            lines.push(format!("Tags: {}", self.tags.join(", ")));
        }
        lines.join("\n")
    }
}

/// Ingest species profiles into the global knowledge base. Profiles are keyed
/// by species id, so re-ingesting replaces them.
pub async fn ingest_species(store: &DocumentStore, path: &Path) -> Result<Vec<Ingested>> {
    let records: Vec<SpeciesRecord> = load_records(path).await?;
    let mut items = Vec::new();
    let mut ingested = Vec::new();

    for record in &records {
        if record.id.is_empty() {
            warn!(title = %record.title(), "Skipping species row without id");
            continue;
        }
        let doc_id = format!("species:{}", record.id);
        let chunk = chunk_items(
            &doc_id,
            &record.title(),
            &record.profile_text(),
            None,
            SourceType::GlobalKb,
            SPECIES_CHUNKING,
        );
        ingested.push(Ingested {
            doc_id,
            name: record.title(),
            chunks: chunk.len(),
            already_present: false,
        });
        items.extend(chunk);
    }

    if !items.is_empty() {
        store.put_items(&items).await?;
    }
    info!(
        species = ingested.len(),
        skipped = records.len() - ingested.len(),
        chunks = items.len(),
        "species profiles ingested"
    );
    Ok(ingested)
}

/// A fetched web document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WebPayload {
    pub content: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub domain: Option<String>,
}

impl WebPayload {
    fn name(&self) -> String {
        self.title
            .as_deref()
            .or(self.url.as_deref())
            .or(self.domain.as_deref())
            .unwrap_or("web document")
            .to_string()
    }
}

/// Ingest a JSON file of web documents. Payloads without content are skipped.
pub async fn ingest_web(
    store: &DocumentStore,
    path: &Path,
    project_id: Option<&str>,
) -> Result<Vec<Ingested>> {
    let payloads: Vec<WebPayload> = load_records(path).await?;
    let source = web_source(project_id);
    let mut ingested = Vec::new();

    for payload in &payloads {
        let Some(content) = payload.content.as_deref().filter(|c| !c.trim().is_empty()) else {
            debug!(name = %payload.name(), "web payload has no content, skipping");
            continue;
        };
        let mut hasher = blake3::Hasher::new();
        hasher.update(payload.url.as_deref().unwrap_or("").as_bytes());
        hasher.update(content.as_bytes());
        let doc_id = hasher.finalize().to_hex().to_string();

        let name = payload.name();
        let items = chunk_items(&doc_id, &name, content, project_id, source, WEB_CHUNKING);
        ingested.push(store_document(store, doc_id, name, items).await?);
    }

    info!(
        documents = ingested.len(),
        skipped = payloads.len() - ingested.len(),
        chunks = ingested.iter().map(|i| i.chunks).sum::<usize>(),
        project_id = project_id.unwrap_or("global"),
        "web documents ingested"
    );
    Ok(ingested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_overlap() {
        let config = ChunkingConfig {
            max_tokens: 4,
            overlap: 1,
        };
        let chunks = chunk_text("a b c d e f g", config);
        assert_eq!(chunks, vec!["a b c d", "d e f g"]);
    }

    #[test]
    fn test_chunk_text_empty_and_short() {
        assert!(chunk_text("   \n ", UPLOAD_CHUNKING).is_empty());
        assert_eq!(chunk_text("one two", UPLOAD_CHUNKING), vec!["one two"]);
    }

    #[test]
    fn test_chunk_text_always_advances() {
        let config = ChunkingConfig {
            max_tokens: 2,
            overlap: 5,
        };
        let chunks = chunk_text("a b c", config);
        assert_eq!(chunks, vec!["a b", "b c"]);
    }

    #[test]
    fn test_extract_text_formats() {
        let html = b"<html><body><h1>Street trees</h1><p>Plant linden.</p></body></html>";
        let text = extract_text(html, "guide.html", None).unwrap();
        assert!(text.contains("Street trees"));
        assert!(!text.contains("<p>"));

        let plain = extract_text(b"soil: clay", "notes.txt", None).unwrap();
        assert_eq!(plain, "soil: clay");

        let csv = extract_text(b"species,height\nTilia,20", "trees.csv", None).unwrap();
        assert_eq!(csv, "species,height\nTilia,20");
    }

    #[test]
    fn test_unreadable_binary_formats_are_errors() {
        assert!(extract_text(b"not a pdf", "manual.pdf", None).is_err());
        assert!(extract_text(b"not a pdf", "download", Some("application/pdf")).is_err());
        assert!(extract_text(b"not a workbook", "sheet.xlsx", None).is_err());
    }

    #[test]
    fn test_sheet_block_quotes_cells() {
        let rows = vec![
            vec!["Species".to_string(), "Note".to_string()],
            vec!["Tilia".to_string(), "shade, \"tolerant\"".to_string()],
        ];
        let block = sheet_block("Trees", rows);
        assert_eq!(
            block,
            "Sheet: Trees\nSpecies,Note\nTilia,\"shade, \"\"tolerant\"\"\"\n"
        );
    }

    #[test]
    fn test_chunk_items_ids_and_names() {
        let config = ChunkingConfig {
            max_tokens: 2,
            overlap: 0,
        };
        let items = chunk_items(
            "abc",
            "manual.txt",
            "w1 w2 w3",
            Some("p1"),
            SourceType::PolicyManual,
            config,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "abc:0");
        assert_eq!(items[1].id, "abc:1");
        assert_eq!(items[0].item_id.as_deref(), Some("abc"));
        assert_eq!(items[0].name, "manual.txt (part 1/2)");
        assert_eq!(items[0].source, "policy_manual");
        assert_eq!(items[1].content.as_deref(), Some("w3"));
    }

    #[test]
    fn test_species_profile_text() {
        let record = SpeciesRecord {
            id: "s1".to_string(),
            genus: Some("Tilia".to_string()),
            species: Some("cordata".to_string()),
            family: Some("Malvaceae".to_string()),
            tags: vec!["shade".to_string(), "street".to_string()],
            ..Default::default()
        };
        assert_eq!(
            record.profile_text(),
            "Species Profile\nGenus: Tilia\nSpecies: cordata\nFamily: Malvaceae\nTags: shade, street"
        );
        assert_eq!(record.title(), "Tilia cordata");
    }

    #[test]
    fn test_url_name() {
        assert_eq!(url_name("https://example.org/guides/street-trees/"), "street-trees");
        assert_eq!(url_name("https://example.org/"), "example.org");
    }

    #[tokio::test]
    async fn test_ingest_file_skips_known_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(&dir.path().join("store")).await.unwrap();
        let path = dir.path().join("survey.txt");
        std::fs::write(&path, "Clay soil along the canal").unwrap();

        let first = ingest_file(&store, &path, Some("p1"), SourceType::Upload).await.unwrap();
        assert!(!first.already_present);
        assert_eq!(first.chunks, 1);

        let again = ingest_file(&store, &path, Some("p1"), SourceType::Upload).await.unwrap();
        assert!(again.already_present);
        assert_eq!(again.doc_id, first.doc_id);
        assert_eq!(store.list_items(Some("p1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_species_into_knowledge_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(&dir.path().join("store")).await.unwrap();
        let path = dir.path().join("species.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "s1", "genus": "Tilia", "species": "cordata", "common_name": "Small-leaved lime", "class": "Magnoliopsida", "tags": ["shade"]},
                {"genus": "Acer"}
            ]"#,
        )
        .unwrap();

        let ingested = ingest_species(&store, &path).await.unwrap();
        assert_eq!(ingested.len(), 1);
        assert_eq!(ingested[0].doc_id, "species:s1");

        let items = store.list_items(None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "species:s1:0");
        assert_eq!(items[0].name, "Small-leaved lime");
        assert_eq!(items[0].source_type(), SourceType::GlobalKb);
        let content = items[0].content.as_deref().unwrap();
        assert!(content.starts_with("Species Profile Genus: Tilia"));
        assert!(content.contains("Class: Magnoliopsida"));
    }

    #[tokio::test]
    async fn test_ingest_web_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(&dir.path().join("store")).await.unwrap();
        let path = dir.path().join("web.json");
        std::fs::write(
            &path,
            r#"[
                {"url": "https://example.org/linden", "title": "Linden care", "content": "Linden tolerates paving."},
                {"url": "https://example.org/empty", "title": "Empty"}
            ]"#,
        )
        .unwrap();

        let ingested = ingest_web(&store, &path, Some("p1")).await.unwrap();
        assert_eq!(ingested.len(), 1);
        assert_eq!(ingested[0].name, "Linden care");

        let items = store.list_items(Some("p1")).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_type(), SourceType::Upload);
        assert_eq!(items[0].content.as_deref(), Some("Linden tolerates paving."));

        let single = dir.path().join("one.json");
        std::fs::write(&single, r#"{"domain": "example.org", "content": "Oak roots spread wide."}"#)
            .unwrap();
        let ingested = ingest_web(&store, &single, None).await.unwrap();
        assert_eq!(ingested[0].name, "example.org");
        assert_eq!(store.list_items(None).await.unwrap()[0].source_type(), SourceType::GlobalKb);
    }
}
