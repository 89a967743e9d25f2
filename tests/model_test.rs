use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use lstm_chat::config::ModelConfig;
use lstm_chat::{ChatError, Seq2Seq};

const VOCAB_SIZE: usize = 7;

fn model_config() -> ModelConfig {
    ModelConfig {
        embedding_dim: 8,
        hidden_dim: 12,
        num_layers: 2,
    }
}

fn build(seed: u64) -> Seq2Seq {
    Seq2Seq::new(VOCAB_SIZE, &model_config(), &mut ChaCha8Rng::seed_from_u64(seed))
}

#[test]
fn test_forward_returns_distribution() {
    let model = build(1);
    let state = model.zero_state();
    let (probs, next_state) = model.forward(3, &state).unwrap();

    assert_eq!(probs.len(), VOCAB_SIZE);
    assert!(probs.iter().all(|&p| p >= 0.0 && p.is_finite()));
    assert!((probs.sum() - 1.0).abs() < 1e-5);

    assert_eq!(next_state.layers.len(), 2);
    for layer in &next_state.layers {
        assert_eq!(layer.hidden.len(), 12);
        assert_eq!(layer.cell.len(), 12);
    }
    assert_ne!(next_state, state);
}

#[test]
fn test_state_changes_prediction() {
    let model = build(2);
    let zero = model.zero_state();
    let (_, after_one) = model.forward(1, &zero).unwrap();

    let (from_zero, _) = model.forward(4, &zero).unwrap();
    let (from_context, _) = model.forward(4, &after_one).unwrap();
    assert_ne!(from_zero, from_context);
}

#[test]
fn test_forward_does_not_mutate_model() {
    let model = build(3);
    let state = model.zero_state();
    let (first, _) = model.forward(2, &state).unwrap();
    let (second, _) = model.forward(2, &state).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_same_seed_same_model() {
    let a = build(42);
    let b = build(42);
    let c = build(43);
    let state = a.zero_state();

    let (pa, _) = a.forward(5, &state).unwrap();
    let (pb, _) = b.forward(5, &state).unwrap();
    let (pc, _) = c.forward(5, &state).unwrap();
    assert_eq!(pa, pb);
    assert_ne!(pa, pc);
}

#[test]
fn test_out_of_range_token() {
    let model = build(4);
    let result = model.forward(VOCAB_SIZE, &model.zero_state());
    assert!(matches!(
        result,
        Err(ChatError::TokenOutOfRange { id: VOCAB_SIZE, vocab_size: VOCAB_SIZE })
    ));
}

#[test]
fn test_state_shape_checked() {
    let model = build(5);
    let mut state = model.zero_state();
    state.layers.pop();
    assert!(matches!(
        model.forward(0, &state),
        Err(ChatError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_prime_matches_manual_unroll() {
    let model = build(6);
    let (primed, primed_state) = model.prime(&[1, 2, 3]).unwrap();

    let mut state = model.zero_state();
    let mut probs = None;
    for &id in &[1, 2, 3] {
        let (p, s) = model.forward(id, &state).unwrap();
        probs = Some(p);
        state = s;
    }
    assert_eq!(Some(primed), probs);
    assert_eq!(primed_state, state);

    assert!(matches!(model.prime(&[]), Err(ChatError::EmptyPrompt)));
}

#[test]
fn test_network_description() {
    let model = build(7);
    assert_eq!(
        model.network_description(),
        "Embeddings, Encoder, Decoder, OutputProjection"
    );
    assert!(model.total_parameters() > 0);
    assert_eq!(model.vocab_size(), VOCAB_SIZE);
    assert_eq!(model.hidden_size(), 12);
}
