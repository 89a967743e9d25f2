use std::thread;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use lstm_chat::config::{ModelConfig, SamplingConfig};
use lstm_chat::vocab::EOS_TOKEN;
use lstm_chat::{ChatBot, ChatError, Sampler, Seq2Seq, Vocab};

fn model_config() -> ModelConfig {
    ModelConfig {
        embedding_dim: 6,
        hidden_dim: 10,
        num_layers: 2,
    }
}

fn build(vocab_size: usize, seed: u64) -> Seq2Seq {
    Seq2Seq::new(vocab_size, &model_config(), &mut ChaCha8Rng::seed_from_u64(seed))
}

/// 输出偏置压倒一切，模型总是预测 `token`
fn always_predict(model: &mut Seq2Seq, token: usize) {
    model.output_projection.b_out.fill(-50.0);
    model.output_projection.b_out[[0, token]] = 50.0;
}

#[test]
fn test_generate_exact_length_in_range() {
    let model = build(6, 1);
    let sampler = Sampler::new(20);
    let mut rng = ChaCha8Rng::seed_from_u64(2);

    let output = sampler.generate(&model, &[0, 3], &mut rng).unwrap();
    assert_eq!(output.len(), 20);
    assert!(output.iter().all(|&id| id < 6));
}

#[test]
fn test_generate_is_seed_deterministic() {
    let model = build(6, 3);
    let sampler = Sampler::new(15);

    let a = sampler
        .generate(&model, &[1], &mut ChaCha8Rng::seed_from_u64(9))
        .unwrap();
    let b = sampler
        .generate(&model, &[1], &mut ChaCha8Rng::seed_from_u64(9))
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_generate_zero_length_and_empty_prompt() {
    let model = build(4, 4);
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    assert!(Sampler::new(0).generate(&model, &[1], &mut rng).unwrap().is_empty());
    assert!(matches!(
        Sampler::new(5).generate(&model, &[], &mut rng),
        Err(ChatError::EmptyPrompt)
    ));
    assert!(matches!(
        Sampler::new(5).generate(&model, &[4], &mut rng),
        Err(ChatError::TokenOutOfRange { .. })
    ));
}

#[test]
fn test_stop_token_ends_reply() {
    let vocab = Vocab::new(vec!["hi", "there"]).unwrap().with_token(EOS_TOKEN);
    let eos = vocab.eos_token_id().unwrap();
    let mut model = build(vocab.len(), 5);
    always_predict(&mut model, eos);

    let sampler = Sampler::from_config(&SamplingConfig::default(), &vocab);
    assert_eq!(sampler.stop_token, Some(eos));
    let mut rng = ChaCha8Rng::seed_from_u64(6);

    // 回复在第一个结束符处停止
    assert!(sampler.generate_reply(&model, &[0], &mut rng).unwrap().is_empty());
    // 固定长度生成不理会结束符
    assert_eq!(
        sampler.generate(&model, &[0], &mut rng).unwrap(),
        vec![eos; sampler.max_length]
    );
}

#[test]
fn test_stop_at_eos_disabled() {
    let vocab = Vocab::new(vec!["hi"]).unwrap().with_token(EOS_TOKEN);
    let config = SamplingConfig {
        stop_at_eos: false,
        ..SamplingConfig::default()
    };
    assert_eq!(Sampler::from_config(&config, &vocab).stop_token, None);
}

#[test]
fn test_chatbot_reply() {
    let vocab = Vocab::new(vec!["hi", "there", "bye"]).unwrap();
    let mut model = build(vocab.len(), 7);
    always_predict(&mut model, 1);

    let sampler = Sampler::new(3);
    let bot = ChatBot::new(model, vocab, sampler).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(8);

    assert_eq!(bot.reply("HI stranger", &mut rng).unwrap(), "there there there");
    // 没有已知词
    assert_eq!(bot.reply("stranger danger", &mut rng).unwrap(), "");
    assert_eq!(bot.reply("", &mut rng).unwrap(), "");
}

#[test]
fn test_chatbot_vocab_size_checked() {
    let vocab = Vocab::new(vec!["hi", "there"]).unwrap();
    let model = build(3, 9);
    assert!(matches!(
        ChatBot::new(model, vocab, Sampler::new(5)),
        Err(ChatError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_concurrent_replies_share_model() {
    let vocab = Vocab::new(vec!["hi", "there", "bye", "friend"]).unwrap();
    let model = build(vocab.len(), 10);
    let bot = ChatBot::new(model, vocab, Sampler::new(8)).unwrap();

    let expected: Vec<String> = (0..4u64)
        .map(|seed| {
            bot.reply("hi friend", &mut ChaCha8Rng::seed_from_u64(seed))
                .unwrap()
        })
        .collect();

    let concurrent: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4u64)
            .map(|seed| {
                let bot = &bot;
                scope.spawn(move || {
                    bot.reply("hi friend", &mut ChaCha8Rng::seed_from_u64(seed))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(concurrent, expected);
    for reply in &concurrent {
        assert_eq!(reply.split(' ').count(), 8);
    }
}
