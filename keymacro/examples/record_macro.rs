use keymacro::{create_backend, MacroRecorder, RecorderConfig, VirtualKey};
use std::path::PathBuf;
use tokio_stream::StreamExt;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Records into a macro for the window named by the first argument
/// (default "Untitled - Notepad") until F12 is pressed.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Untitled - Notepad".to_string());

    let backend = create_backend()?;
    let config = RecorderConfig::default();
    debug!("Installing recorder with config: {:?}", config);
    let mut recorder = MacroRecorder::install(backend, config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let mut records = recorder.record_stream();
    let printer = runtime.spawn(async move {
        while let Some(record) = records.next().await {
            println!("Received record: {}", record);
        }
    });

    info!("Recording for \"{}\". Press F12 to stop...", target);
    recorder.start(VirtualKey::resolve("F12"), false)?;

    let sequence = recorder.to_sequence(&target)?;
    let raw_path = PathBuf::from("macro_recording.json");
    debug!("Saving raw recording to {:?}", raw_path);
    recorder.save_records(&raw_path)?;
    recorder.close()?;
    runtime.block_on(printer)?;

    let output_path = PathBuf::from("recorded.macro");
    sequence.save_to_file(&output_path)?;
    info!("Macro saved to {:?}", output_path);
    Ok(())
}
