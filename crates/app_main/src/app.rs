//! Application main loop
//!
//! Single-threaded driver: console commands and watcher events are applied
//! between engine pumps, so the engine only ever runs on this thread.

use crate::console::{self, ConsoleCommand};
use anyhow::{Context, Result};
use app_core::{
    AppConfig, CoreEvent, DirectoryModel, NavigationCore, Presenter, Services, Subscription, ThumbnailStrip,
};
use app_fs::{DefaultFileOperations, FileWatcher};
use crossbeam_channel::{Receiver, TryRecvError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(16);

/// Strip panel size for the headless thumbnail view
const STRIP_WIDTH: u32 = 1280;
const STRIP_HEIGHT: u32 = 125;

struct App {
    model: Arc<DirectoryModel>,
    core: NavigationCore,
    presenter: Presenter,
    events: Subscription<CoreEvent>,
    watcher: Option<FileWatcher>,
    commands: Receiver<ConsoleCommand>,
}

impl App {
    fn new(config: AppConfig, commands: Receiver<ConsoleCommand>) -> Result<Self> {
        let file_ops = Arc::new(DefaultFileOperations::new(config.directory.use_recycle_bin));
        let model = Arc::new(DirectoryModel::from_config(&config, file_ops));

        let watcher = match FileWatcher::new(config.directory.watch_debounce()) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!("File watching disabled: {}", e);
                None
            }
        };

        let services = Services::image_rs(&config);
        let core = NavigationCore::new(config, model.clone(), services)?;
        let events = core.subscribe();

        let mut presenter = Presenter::new();
        presenter.attach_view(Box::new(ThumbnailStrip::new(STRIP_WIDTH, STRIP_HEIGHT)));
        presenter.set_model(model.clone());

        Ok(Self {
            model,
            core,
            presenter,
            events,
            watcher,
            commands,
        })
    }

    fn open(&mut self, target: &Path) -> Result<()> {
        if target.is_dir() {
            self.core.open_dir(target)?;
        } else {
            self.core.load_image(target);
        }
        if self.model.dir().is_none() {
            anyhow::bail!("nothing to show at {}", target.display());
        }
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        loop {
            loop {
                match self.commands.try_recv() {
                    Ok(ConsoleCommand::Quit) | Err(TryRecvError::Disconnected) => return Ok(()),
                    Ok(command) => self.execute(command),
                    Err(TryRecvError::Empty) => break,
                }
            }

            let now = Instant::now();
            self.sync_watcher();
            self.core.pump();
            self.presenter.pump();
            self.core.tick(now);

            for event in self.events.drain() {
                log_event(&event);
            }

            std::thread::sleep(FRAME);
        }
    }

    /// Fold watcher events into the model and keep the watch on the model's directory
    fn sync_watcher(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };

        let dir = self.model.dir();
        if dir.as_deref() != watcher.watched_dir() {
            if let Some(dir) = &dir {
                if let Err(e) = watcher.watch_dir(dir) {
                    tracing::warn!("Cannot watch {}: {}", dir.display(), e);
                }
            }
        }

        let now = Instant::now();
        let fs_events = watcher.poll_events();
        if fs_events.is_empty() {
            self.model.flush_expired(now);
        } else {
            tracing::debug!("{} file system events", fs_events.len());
            self.model.apply_fs_events(&fs_events, now);
        }
    }

    fn execute(&mut self, command: ConsoleCommand) {
        tracing::debug!("Console command: {:?}", command);
        let result = match command {
            ConsoleCommand::Next => self.core.next(),
            ConsoleCommand::Prev => self.core.prev(),
            ConsoleCommand::Goto(pos) => self.core.load_by_pos(pos),
            ConsoleCommand::Rotate(degrees) => {
                if !self.core.rotate(degrees) {
                    println!("cannot rotate by {}", degrees);
                }
                Ok(())
            }
            ConsoleCommand::Crop(rect) => {
                if !self.core.crop(rect) {
                    println!("nothing to crop");
                }
                Ok(())
            }
            ConsoleCommand::Zoom(size) => {
                if self.core.rescale_for_zoom(size).is_none() {
                    println!("nothing to scale");
                }
                Ok(())
            }
            ConsoleCommand::Remove => self.core.remove_file(),
            ConsoleCommand::Sort(by, order) => {
                self.model.set_sorting(by, order);
                Ok(())
            }
            ConsoleCommand::Save(target) => self.core.save_image(target.as_deref()).map(|saved| match saved {
                Some(path) => println!("saved {}", path.display()),
                None => println!("only static images can be saved"),
            }),
            ConsoleCommand::Wallpaper { region, screen } => {
                self.core.set_wallpaper(region, screen).map(|set| {
                    if !set {
                        println!("wallpaper needs a static image and a non-empty region");
                    }
                })
            }
            ConsoleCommand::Info => {
                match self.core.info() {
                    Some(info) => println!("{}", info),
                    None => println!("no current item"),
                }
                Ok(())
            }
            ConsoleCommand::Help => {
                println!("{}", console::HELP);
                Ok(())
            }
            ConsoleCommand::Quit => Ok(()),
        };

        if let Err(e) = result {
            tracing::warn!("Command failed: {}", e);
            println!("{}", e.user_message());
        }
    }
}

fn log_event(event: &CoreEvent) {
    match event {
        CoreEvent::LoadStarted { position } => tracing::debug!("Loading position {}", position),
        CoreEvent::LoadingTimeout => println!("loading..."),
        CoreEvent::SetStaticImage { position, bitmap } => {
            tracing::info!("Showing image {} ({}x{})", position, bitmap.width(), bitmap.height())
        }
        CoreEvent::SetAnimation {
            position, frame_count, ..
        } => tracing::info!("Showing animation {} ({} frames)", position, frame_count),
        CoreEvent::FrameChanged { .. } => tracing::trace!("Frame changed"),
        CoreEvent::SetVideo { position, clip } => {
            tracing::info!("Showing video {} ({})", position, clip.path.display())
        }
        CoreEvent::StopVideo => tracing::debug!("Video stopped"),
        CoreEvent::UnsetImage { position, error } => match error {
            Some(e) => println!("cannot show {:?}: {}", position, e),
            None => println!("no image"),
        },
        CoreEvent::StaticImageAltered { bitmap } => {
            tracing::info!("Image altered ({}x{})", bitmap.width(), bitmap.height())
        }
        CoreEvent::VideoAltered { clip } => {
            tracing::info!("Video altered (rotation {}, crop {:?})", clip.rotation, clip.crop)
        }
        CoreEvent::ScalingFinished { bitmap } => {
            tracing::info!("Scaled to {}x{}", bitmap.width(), bitmap.height())
        }
        CoreEvent::ImageChanged { position } => tracing::debug!("Current position {}", position),
        CoreEvent::InfoChanged(info) => println!("{}", info),
        CoreEvent::CacheInitialized { count } => tracing::debug!("Cache ready for {} files", count),
    }
}

/// Run the viewer on `target` (a directory or a file in it)
pub fn run(config: AppConfig, target: PathBuf) -> Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let _console = console::spawn_reader(tx).context("starting console reader")?;

    let mut app = App::new(config, rx)?;
    app.open(&target)?;
    println!("{}", console::HELP);
    app.run()
}
