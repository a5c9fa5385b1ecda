// compliance-backend/src/utils/archive.rs

//! エクスポート用のアーカイブ生成 (.tar.gz) とCSV変換

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{self, Read};

/// アーカイブに含める1ファイル
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub contents: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// ファイル群を gzip 圧縮した tar アーカイブにまとめる
pub fn build_tar_gz(entries: &[ArchiveEntry], modified_at: DateTime<Utc>) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(entry.contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(modified_at.timestamp().max(0) as u64);
        builder.append_data(&mut header, &entry.name, entry.contents.as_slice())?;
    }

    builder.into_inner()?.finish()
}

/// .tar.gz を展開してファイル名と内容の一覧を返す
pub fn read_tar_gz(bytes: &[u8]) -> io::Result<Vec<ArchiveEntry>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        entries.push(ArchiveEntry { name, contents });
    }

    Ok(entries)
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        // ネストした値はJSONのまま1セルに収める
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn push_record(output: &mut String, section: &str, index: usize, record: &Value) {
    match record {
        Value::Object(fields) => {
            for (field, value) in fields {
                output.push_str(&format!(
                    "{},{},{},{}\n",
                    escape_csv(section),
                    index,
                    escape_csv(field),
                    escape_csv(&scalar_to_string(value))
                ));
            }
        }
        other => {
            output.push_str(&format!(
                "{},{},,{}\n",
                escape_csv(section),
                index,
                escape_csv(&scalar_to_string(other))
            ));
        }
    }
}

/// セクションごとのJSONを縦持ちのCSV (secao,registro,campo,valor) に変換する
pub fn json_sections_to_csv(document: &Value) -> String {
    let mut output = String::new();
    output.push_str("secao,registro,campo,valor\n");

    if let Value::Object(sections) = document {
        for (section, value) in sections {
            match value {
                Value::Array(records) => {
                    for (index, record) in records.iter().enumerate() {
                        push_record(&mut output, section, index, record);
                    }
                }
                other => push_record(&mut output, section, 0, other),
            }
        }
    }

    output
}
