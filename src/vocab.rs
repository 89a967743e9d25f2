use std::collections::HashMap;
use std::fs;
use std::path::Path;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

pub const UNK_TOKEN: &str = "<unk>";
pub const EOS_TOKEN: &str = "</s>";

/// 遇到词表外的词时的处理方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTokenPolicy {
    /// 丢弃该词
    Skip,
    /// 映射到保留的 `<unk>` id
    Reserved,
    /// 报错
    Reject,
}

#[derive(Clone, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct Vocab {
    pub encode: HashMap<String, usize>,
    pub decode: HashMap<usize, String>,
    pub words: Vec<String>,
}

impl Vocab {
    /// Build a vocabulary where each word's id is its position.
    pub fn new(words: Vec<&str>) -> Result<Self> {
        let mapping = words
            .iter()
            .enumerate()
            .map(|(i, &w)| (w.to_string(), i))
            .collect::<HashMap<_, _>>();
        if mapping.len() != words.len() {
            return Err(ChatError::VocabNotBijective(
                "duplicate word in word list".to_string(),
            ));
        }
        Self::from_mapping(mapping)
    }

    /// Build from an explicit `token -> id` mapping.
    ///
    /// The ids must cover `[0, len)` exactly once; the reverse map is derived.
    pub fn from_mapping(encode: HashMap<String, usize>) -> Result<Self> {
        let size = encode.len();
        let mut slots: Vec<Option<String>> = vec![None; size];

        for (word, &id) in &encode {
            if id >= size {
                return Err(ChatError::VocabNotBijective(format!(
                    "id {id} for `{word}` is outside [0, {size})"
                )));
            }
            if let Some(other) = &slots[id] {
                return Err(ChatError::VocabNotBijective(format!(
                    "id {id} shared by `{other}` and `{word}`"
                )));
            }
            slots[id] = Some(word.clone());
        }

        // 每个 id 恰好出现一次时 slots 必然被填满
        let words: Vec<String> = slots.into_iter().flatten().collect();
        let decode = words
            .iter()
            .enumerate()
            .map(|(i, w)| (i, w.clone()))
            .collect();

        Ok(Vocab {
            encode,
            decode,
            words,
        })
    }

    /// Load a JSON object of `token -> id`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ChatError::VocabRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mapping: HashMap<String, usize> =
            serde_json::from_str(&raw).map_err(|source| ChatError::VocabDecode {
                path: path.to_path_buf(),
                source,
            })?;
        let vocab = Self::from_mapping(mapping)?;
        log::info!("词汇表加载完成: {} 个词 ({})", vocab.len(), path.display());
        Ok(vocab)
    }

    /// Append `token` at the next dense id unless it is already present.
    pub fn with_token(mut self, token: &str) -> Self {
        if !self.encode.contains_key(token) {
            let id = self.words.len();
            self.encode.insert(token.to_string(), id);
            self.decode.insert(id, token.to_string());
            self.words.push(token.to_string());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Convert a word to its token index
    pub fn encode(&self, word: &str) -> Option<usize> {
        self.encode.get(word).copied()
    }

    /// Convert a token index back to a word
    pub fn decode(&self, token_id: usize) -> Option<&String> {
        self.decode.get(&token_id)
    }

    pub fn unk_token_id(&self) -> Option<usize> {
        self.encode(UNK_TOKEN)
    }

    pub fn eos_token_id(&self) -> Option<usize> {
        self.encode(EOS_TOKEN)
    }

    /// Whitespace tokenization followed by id lookup.
    pub fn encode_sequence(&self, text: &str, policy: UnknownTokenPolicy) -> Result<Vec<usize>> {
        let mut ids = Vec::new();
        for word in tokenize(text) {
            match self.encode(word) {
                Some(id) => ids.push(id),
                None => match policy {
                    UnknownTokenPolicy::Skip => {
                        log::debug!("跳过词表外的词: {word}");
                    }
                    UnknownTokenPolicy::Reserved => match self.unk_token_id() {
                        Some(unk) => ids.push(unk),
                        None => return Err(ChatError::UnknownToken(word.to_string())),
                    },
                    UnknownTokenPolicy::Reject => {
                        return Err(ChatError::UnknownToken(word.to_string()));
                    }
                },
            }
        }
        Ok(ids)
    }

    /// Ids without an entry are dropped.
    pub fn decode_sequence(&self, ids: &[usize]) -> String {
        ids.iter()
            .filter_map(|&id| self.decode(id).map(String::as_str))
            .collect::<Vec<&str>>()
            .join(" ")
    }
}

pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

