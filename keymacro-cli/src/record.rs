use crate::Args;
use anyhow::{anyhow, bail, Context};
use keymacro::{
    create_backend, InputBackend, MacroRecorder, MacroSequence, RecorderConfig, VirtualKey,
};
use std::io::{self, BufRead, Write};
use tokio_stream::StreamExt;
use tracing::info;

pub fn run(args: &Args) -> anyhow::Result<()> {
    let backend = create_backend()?;

    let existing = if args.append && args.file.exists() {
        Some(
            MacroSequence::load_from_file(&args.file)
                .with_context(|| format!("failed to load macro file {:?}", args.file))?,
        )
    } else {
        None
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();

    let stop_key = prompt_stop_key(&mut input)?;
    let mut sequence = match existing {
        Some(sequence) => {
            info!("Appending to macro for \"{}\"", sequence.target_window());
            sequence
        }
        None => MacroSequence::new(prompt_window(&mut input, backend.as_ref())?)?,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let mut recorder = MacroRecorder::install(backend, RecorderConfig::default())?;

    let mut records = recorder.record_stream();
    let printer = runtime.spawn(async move {
        while let Some(record) = records.next().await {
            println!("{}", record);
        }
    });

    println!("Recording. Press {} to stop.", stop_key);
    recorder.start(stop_key, false)?;

    recorder.append_sequence(&mut sequence)?;
    if let Some(path) = &args.dump_records {
        recorder.save_records(path)?;
    }
    recorder.close()?;
    runtime.block_on(printer)?;

    sequence.save_to_file(&args.file)?;
    println!("Saved {} items to {:?}", sequence.len(), args.file);
    Ok(())
}

fn read_line(input: &mut impl BufRead) -> anyhow::Result<String> {
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("unexpected end of input");
    }
    Ok(line.trim().to_string())
}

fn prompt_stop_key(input: &mut impl BufRead) -> anyhow::Result<VirtualKey> {
    loop {
        print!("Stop key (e.g. Escape, F12): ");
        let name = read_line(input)?;
        match VirtualKey::from_name(&name) {
            Some(key) => return Ok(key),
            None => println!("Unknown key '{}'", name),
        }
    }
}

fn prompt_window(input: &mut impl BufRead, backend: &dyn InputBackend) -> anyhow::Result<String> {
    let windows = backend.list_windows()?;
    if windows.is_empty() {
        return Err(anyhow!("no windows available to record against"));
    }
    for (index, title) in windows.iter().enumerate() {
        println!("{:>3}: {}", index, title);
    }
    loop {
        print!("Target window number: ");
        let choice = read_line(input)?;
        match choice.parse::<usize>().ok().and_then(|i| windows.get(i)) {
            Some(title) => return Ok(title.clone()),
            None => println!("Invalid choice '{}'", choice),
        }
    }
}
