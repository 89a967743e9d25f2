use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::Rng;

use lstm_chat::{
    ChatBot, ChatError, Config, Dataset, Result, Sampler, Seq2Seq, Trainer, Vocab, load_model_auto,
    save_model_auto, seeded_rng, trainer::evaluate,
};

// ============ CLI ============
#[derive(Parser)]
#[command(name = "lstm-chat")]
#[command(version)]
#[command(about = "词级别 LSTM 序列到序列聊天模型")]
struct Cli {
    /// JSON 配置文件，缺省字段取默认值
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖配置中的随机种子
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// 输出每个样本的调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 在语料目录上训练新模型
    Train {
        #[arg(long)]
        epochs: Option<usize>,
        /// 训练结束后保存到此路径（.json 或二进制）
        #[arg(short, long)]
        save: Option<PathBuf>,
        /// 训练结束后进入交互对话
        #[arg(long)]
        chat: bool,
    },

    /// 加载已保存的模型，从标准输入逐行对话
    Chat {
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// 打印网络结构和参数量
    Info {
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("日志初始化失败: {}", e);
    }

    if let Err(e) = run(cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    let mut rng = seeded_rng(config.seed);

    match cli.command {
        Commands::Train { epochs, save, chat } => {
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }

            let vocab = Vocab::load(&config.data.vocab_path)?;
            let dataset =
                Dataset::load(&config.data.corpus_dir, &vocab, config.data.unknown_tokens)?;

            let mut model = Seq2Seq::new(vocab.len(), &config.model, &mut rng);
            log::info!(
                "网络架构: {} | 总参数量: {}",
                model.network_description(),
                model.total_parameters()
            );

            let mut trainer = Trainer::new(config.training.clone());
            let report = trainer.train(&mut model, &dataset, &mut rng)?;
            log::info!(
                "训练完成: {} 个 epoch, {} 次更新, 最终损失 {:.4}",
                report.epoch_losses.len(),
                report.steps,
                evaluate(&model, &dataset)?
            );

            if let Some(path) = save.as_ref().or(config.data.model_path.as_ref()) {
                save_model_auto(&model, &vocab, path)?;
            }

            if chat {
                let sampler = Sampler::from_config(&config.sampling, &vocab);
                let bot = ChatBot::new(model, vocab, sampler)?;
                interactive_mode(&bot, &mut rng)?;
            }
        }
        Commands::Chat { model } => {
            let path = model_path(model, &config)?;
            let (model, vocab) = load_model_auto(&path)?;
            let sampler = Sampler::from_config(&config.sampling, &vocab);
            let bot = ChatBot::new(model, vocab, sampler)?;
            interactive_mode(&bot, &mut rng)?;
        }
        Commands::Info { model } => {
            let model = match model.or_else(|| config.data.model_path.clone()) {
                Some(path) => load_model_auto(&path)?.0,
                None => {
                    let vocab = Vocab::load(&config.data.vocab_path)?;
                    Seq2Seq::new(vocab.len(), &config.model, &mut rng)
                }
            };
            println!("网络架构: {}", model.network_description());
            println!("词汇量:   {}", model.vocab_size());
            println!("隐藏维度: {}", model.hidden_size());
            println!("总参数量: {}", model.total_parameters());
        }
    }

    Ok(())
}

fn model_path(explicit: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    explicit
        .or_else(|| config.data.model_path.clone())
        .ok_or_else(|| ChatError::Config {
            path: PathBuf::from("<cli>"),
            reason: "no model path given (use --model or data.model_path)".to_string(),
        })
}

/// 每读一行就生成一条回复，读到 EOF 或 `exit` 结束
fn interactive_mode<R: Rng + ?Sized>(bot: &ChatBot, rng: &mut R) -> Result<()> {
    println!("输入消息开始对话，输入 exit 退出");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        stdout.flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }
        if message.is_empty() {
            continue;
        }

        let reply = bot.reply(message, rng)?;
        if reply.is_empty() {
            log::warn!("没有生成回复（消息中可能没有已知词）");
        } else {
            println!("{reply}");
        }
    }
    Ok(())
}
