//! # 训练语料加载
//!
//! 语料目录下每个文件是一个样本：
//!
//! ```text
//! data/greeting.hello.txt
//! ┌──────────────────────────┐
//! │ hi                       │  ← 第 1 行：输入
//! │ hello there              │  ← 之后每一行：一个回复回合（turn）
//! │ nice to meet you         │
//! └──────────────────────────┘
//! 标签 = 去掉扩展名的文件名按 '.' 切分 → ["greeting", "hello"]
//! ```
//!
//! 以 '.' 开头的隐藏文件（如 `.DS_Store`）不算样本，直接跳过。
//! 任何一个文件读不出来、没有输入或没有回复，整个加载失败，训练不会开始。

use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    error::{ChatError, Result},
    vocab::{UnknownTokenPolicy, Vocab},
};

#[derive(Clone, Debug, PartialEq)]
pub struct Example {
    pub input: Vec<usize>,
    pub turns: Vec<Vec<usize>>,
    pub label: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub examples: Vec<Example>,
}

impl Dataset {
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// 按文件名排序加载目录下的全部样本
    ///
    /// 词表包含 `</s>` 时，每个回合末尾追加结束符，让模型学会停止。
    pub fn load<P: AsRef<Path>>(dir: P, vocab: &Vocab, policy: UnknownTokenPolicy) -> Result<Self> {
        let dir = dir.as_ref();
        let corpus_err = |source: std::io::Error| ChatError::CorpusRead {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir).map_err(corpus_err)? {
            let entry = entry.map_err(corpus_err)?;
            if !entry.file_type().map_err(corpus_err)?.is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                log::debug!("跳过隐藏文件 {}", entry.path().display());
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();

        let examples = paths
            .iter()
            .map(|path| load_example(path, vocab, policy))
            .collect::<Result<Vec<_>>>()?;

        if examples.is_empty() {
            return Err(ChatError::MalformedExample {
                path: dir.to_path_buf(),
                reason: "corpus directory contains no examples".to_string(),
            });
        }

        log::info!("加载训练样本 {} 个 ({})", examples.len(), dir.display());
        Ok(Self { examples })
    }
}

fn load_example(path: &Path, vocab: &Vocab, policy: UnknownTokenPolicy) -> Result<Example> {
    let malformed = |reason: String| ChatError::MalformedExample {
        path: path.to_path_buf(),
        reason,
    };

    let text = fs::read_to_string(path).map_err(|source| ChatError::CorpusRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = text.lines();

    let input_line = lines.next().unwrap_or_default();
    let input = vocab
        .encode_sequence(input_line, policy)
        .map_err(|e| malformed(format!("input: {e}")))?;
    if input.is_empty() {
        return Err(malformed("empty input line".to_string()));
    }

    let eos = vocab.eos_token_id();
    let mut turns = Vec::new();
    for (i, line) in lines.enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let mut turn = vocab
            .encode_sequence(line, policy)
            .map_err(|e| malformed(format!("line {}: {e}", i + 2)))?;
        if let Some(eos) = eos {
            turn.push(eos);
        }
        if !turn.is_empty() {
            turns.push(turn);
        }
    }
    if turns.is_empty() {
        return Err(malformed("no reply lines".to_string()));
    }

    Ok(Example {
        input,
        turns,
        label: label_from_path(path),
    })
}

/// 文件名去掉扩展名后按 '.' 切分
pub fn label_from_path(path: &Path) -> Vec<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default()
        .split('.')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
