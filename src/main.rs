use click_replay::capture::RdevCaptureBackend;
use click_replay::engine::{ClickEngine, EngineEventSink, EngineNotification, EngineState};
use click_replay::settings::Settings;
use std::sync::Arc;

/// Headless shell: renders engine notifications as status lines, the way
/// the windowed shell would update its labels and table.
struct StatusSink {
    record_hotkey: String,
    play_hotkey: String,
}

impl EngineEventSink for StatusSink {
    fn dispatch(&self, event: EngineNotification) {
        match event {
            EngineNotification::StateChanged(EngineState::Recording) => {
                println!("Recording — press {} to stop", self.record_hotkey);
            }
            EngineNotification::StateChanged(EngineState::Playing) => {
                println!("Playing — press {} to stop", self.play_hotkey);
            }
            EngineNotification::StateChanged(EngineState::Idle) => {
                println!(
                    "Press {} to start recording, {} to start playing",
                    self.record_hotkey, self.play_hotkey
                );
            }
            EngineNotification::SequenceChanged(sequence) => {
                println!("{} click(s) recorded", sequence.len());
            }
            EngineNotification::CaptureUnavailable(message) => {
                println!("Global input capture unavailable: {message}");
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let settings = Settings::load("settings.json")?;
    click_replay::logging::init(settings.debug_logging, settings.log_file.clone());

    let bindings = settings.bindings()?;
    let sink = Arc::new(StatusSink {
        record_hotkey: settings.record_hotkey.clone(),
        play_hotkey: settings.play_hotkey.clone(),
    });

    let mut engine =
        ClickEngine::new_with_backend(Box::new(RdevCaptureBackend::new(bindings)), sink);
    engine.set_click_delay(settings.click_delay_ms);
    engine.set_loop_enabled(settings.loop_playback);
    engine.start()?;

    println!(
        "Press {} to start recording, {} to start playing, {} to cancel",
        settings.record_hotkey, settings.play_hotkey, settings.cancel_hotkey
    );

    loop {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
}
