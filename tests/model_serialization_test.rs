// 模型序列化测试

use std::fs;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use lstm_chat::config::ModelConfig;
use lstm_chat::model_serialization::SerializableModel;
use lstm_chat::{
    ChatError, Seq2Seq, Vocab, load_model_auto, load_model_binary, load_model_json,
    save_model_auto, save_model_binary, save_model_json,
};

fn setup() -> (Seq2Seq, Vocab) {
    let vocab = Vocab::new(vec!["hi", "there", "bye", "</s>"]).unwrap();
    let config = ModelConfig {
        embedding_dim: 5,
        hidden_dim: 7,
        num_layers: 2,
    };
    let model = Seq2Seq::new(vocab.len(), &config, &mut ChaCha8Rng::seed_from_u64(21));
    (model, vocab)
}

fn assert_same_predictions(original: &Seq2Seq, loaded: &Seq2Seq) {
    let prompt = [0, 2, 1];
    let (expected, expected_state) = original.prime(&prompt).unwrap();
    let (actual, actual_state) = loaded.prime(&prompt).unwrap();
    assert_eq!(expected, actual);
    assert_eq!(expected_state, actual_state);
}

#[test]
fn test_binary_save_and_load() {
    let (model, vocab) = setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");

    save_model_binary(&model, &vocab, &path).unwrap();
    assert!(path.exists());

    let (loaded, loaded_vocab) = load_model_binary(&path).unwrap();
    assert_eq!(loaded.total_parameters(), model.total_parameters());
    assert_eq!(loaded.network_description(), model.network_description());
    assert_eq!(loaded_vocab.words, vocab.words);
    assert_same_predictions(&model, &loaded);
}

#[test]
fn test_json_save_and_load() {
    let (model, vocab) = setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    save_model_json(&model, &vocab, &path).unwrap();
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"metadata\""));

    let (loaded, loaded_vocab) = load_model_json(&path).unwrap();
    assert_eq!(loaded_vocab.eos_token_id(), Some(3));
    assert_same_predictions(&model, &loaded);
}

#[test]
fn test_auto_format_by_extension() {
    let (model, vocab) = setup();
    let dir = tempfile::tempdir().unwrap();

    for name in ["auto.json", "auto.bin"] {
        let path = dir.path().join(name);
        save_model_auto(&model, &vocab, &path).unwrap();
        let (loaded, _) = load_model_auto(&path).unwrap();
        assert_same_predictions(&model, &loaded);
    }

    // 二进制文件不是合法 JSON
    let bin_as_json = dir.path().join("copy.json");
    fs::copy(dir.path().join("auto.bin"), &bin_as_json).unwrap();
    assert!(matches!(
        load_model_auto(&bin_as_json),
        Err(ChatError::Serialization(_))
    ));
}

#[test]
fn test_corrupted_or_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_model_binary(dir.path().join("missing.bin")),
        Err(ChatError::Io(_))
    ));

    let garbage = dir.path().join("garbage.bin");
    fs::write(&garbage, [1u8, 2, 3]).unwrap();
    assert!(load_model_binary(&garbage).is_err());
}

#[test]
fn test_inconsistent_dimensions_rejected() {
    let (model, vocab) = setup();

    let mut snapshot = SerializableModel::from_model(&model, &vocab);
    snapshot.decoder.pop();
    assert!(matches!(
        snapshot.into_model(),
        Err(ChatError::ShapeMismatch { .. })
    ));

    let mut snapshot = SerializableModel::from_model(&model, &vocab);
    snapshot.metadata.vocab_size += 1;
    assert!(matches!(
        snapshot.into_model(),
        Err(ChatError::ShapeMismatch { .. })
    ));

    let mut snapshot = SerializableModel::from_model(&model, &vocab);
    snapshot.embeddings.data.pop();
    assert!(matches!(
        snapshot.into_model(),
        Err(ChatError::ShapeMismatch { .. })
    ));

    let mut snapshot = SerializableModel::from_model(&model, &vocab);
    snapshot.version = 99;
    assert!(matches!(
        snapshot.into_model(),
        Err(ChatError::Serialization(_))
    ));
}

#[test]
fn test_json_vocab_with_shared_id_rejected() {
    let (model, vocab) = setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    save_model_json(&model, &vocab, &path).unwrap();

    // 让 "bye" 与 "hi" 共用 id 0
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"bye\": 2"));
    fs::write(&path, raw.replace("\"bye\": 2", "\"bye\": 0")).unwrap();

    assert!(matches!(
        load_model_json(&path),
        Err(ChatError::VocabNotBijective(_))
    ));
}

#[test]
fn test_vocab_word_list_must_match_ids() {
    let (model, vocab) = setup();

    let mut snapshot = SerializableModel::from_model(&model, &vocab);
    snapshot.vocab.encode.insert("bye".to_string(), 0);
    assert!(matches!(
        snapshot.into_model(),
        Err(ChatError::VocabNotBijective(_))
    ));

    // encode 自洽，但 words 与之不符
    let mut snapshot = SerializableModel::from_model(&model, &vocab);
    snapshot.vocab.words.swap(0, 1);
    assert!(matches!(
        snapshot.into_model(),
        Err(ChatError::VocabNotBijective(_))
    ));

    let mut snapshot = SerializableModel::from_model(&model, &vocab);
    snapshot.vocab.decode.insert(1, "bye".to_string());
    assert!(matches!(
        snapshot.into_model(),
        Err(ChatError::VocabNotBijective(_))
    ));
}
