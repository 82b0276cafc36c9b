use std::{
    fmt,
    io::{IsTerminal, Write},
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::{Duration, Instant},
};

use minifb::{Key, Window, WindowOptions};
use plotters::{coord::Shift, prelude::*};

use crate::env::base::EnvError;

pub const SCREEN_WIDTH: u32 = 600;
pub const SCREEN_HEIGHT: u32 = 400;
pub const RENDER_FPS: u32 = 50;

const ANSI_WIDTH: usize = 61;
const ANSI_HEIGHT: usize = 12;
const ANSI_POLE_ROWS: usize = 8;

const POLE_COLOR: RGBColor = RGBColor(202, 152, 101);
const AXLE_COLOR: RGBColor = RGBColor(129, 132, 203);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Draws to a native window (or the terminal without one), paced to `RENDER_FPS`
    Human,
    /// Returns a text frame
    Ansi,
    /// Returns an RGB pixel frame
    RgbArray,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RenderMode::Human => "human",
            RenderMode::Ansi => "ansi",
            RenderMode::RgbArray => "rgb_array",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RenderMode {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(RenderMode::Human),
            "ansi" => Ok(RenderMode::Ansi),
            "rgb_array" | "rgb" => Ok(RenderMode::RgbArray),
            other => Err(EnvError::UnsupportedRenderMode(other.to_string())),
        }
    }
}

/// Parses a configured render mode, where `none` and `off` disable rendering.
pub fn parse_render_mode(s: &str) -> Result<Option<RenderMode>, EnvError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "off" => Ok(None),
        other => other.parse().map(Some),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderFrame {
    Text(String),
    /// Row-major RGB bytes, `width * height * 3` long
    Pixels {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
}

/// Everything needed to draw one CartPole frame.
#[derive(Debug, Clone, Copy)]
pub struct CartpoleScene {
    pub x: f32,
    pub theta: f32,
    pub x_threshold: f32,
    pub half_length: f32,
}

fn render_err<E: fmt::Display>(e: E) -> EnvError {
    EnvError::Render(e.to_string())
}

fn to_screen(x: f32, y: f32) -> (i32, i32) {
    (x.round() as i32, (SCREEN_HEIGHT as f32 - y).round() as i32)
}

/// Draws the scene with the y axis pointing up, then flipped to screen
/// coordinates.
pub fn draw_scene<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    scene: &CartpoleScene,
) -> Result<(), EnvError> {
    let width = SCREEN_WIDTH as f32;
    let world_width = scene.x_threshold * 2.0;
    let scale = width / world_width;
    let pole_width = 10.0;
    let pole_len = scale * (2.0 * scene.half_length);
    let cart_width = 50.0;
    let cart_height = 30.0;

    let cart_x = scene.x * scale + width / 2.0;
    let cart_y = 100.0;
    let axle_offset = cart_height / 4.0;

    root.fill(&WHITE).map_err(render_err)?;

    let (l, r, t, b) = (
        -cart_width / 2.0,
        cart_width / 2.0,
        cart_height / 2.0,
        -cart_height / 2.0,
    );
    let cart: Vec<(i32, i32)> = [(l, b), (l, t), (r, t), (r, b)]
        .iter()
        .map(|(px, py)| to_screen(px + cart_x, py + cart_y))
        .collect();
    root.draw(&Polygon::new(cart, BLACK.filled()))
        .map_err(render_err)?;

    let (l, r, t, b) = (
        -pole_width / 2.0,
        pole_width / 2.0,
        pole_len - pole_width / 2.0,
        -pole_width / 2.0,
    );
    let (sin, cos) = (-scene.theta).sin_cos();
    let pole: Vec<(i32, i32)> = [(l, b), (l, t), (r, t), (r, b)]
        .iter()
        .map(|(px, py)| {
            let rx = px * cos - py * sin;
            let ry = px * sin + py * cos;
            to_screen(rx + cart_x, ry + cart_y + axle_offset)
        })
        .collect();
    root.draw(&Polygon::new(pole, POLE_COLOR.filled()))
        .map_err(render_err)?;

    root.draw(&Circle::new(
        to_screen(cart_x, cart_y + axle_offset),
        (pole_width / 2.0) as i32,
        AXLE_COLOR.filled(),
    ))
    .map_err(render_err)?;

    root.draw(&PathElement::new(
        vec![to_screen(0.0, cart_y), to_screen(width, cart_y)],
        BLACK,
    ))
    .map_err(render_err)?;

    root.present().map_err(render_err)
}

pub fn rgb_frame(scene: &CartpoleScene) -> Result<RenderFrame, EnvError> {
    let mut data = vec![0u8; (SCREEN_WIDTH * SCREEN_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut data, (SCREEN_WIDTH, SCREEN_HEIGHT))
            .into_drawing_area();
        draw_scene(&root, scene)?;
    }

    Ok(RenderFrame::Pixels {
        width: SCREEN_WIDTH,
        height: SCREEN_HEIGHT,
        data,
    })
}

pub fn save_png(scene: &CartpoleScene, path: &Path) -> Result<(), EnvError> {
    let root = BitMapBackend::new(path, (SCREEN_WIDTH, SCREEN_HEIGHT)).into_drawing_area();
    draw_scene(&root, scene)
}

/// Text drawing of the scene: a header line, the pole, the cart and the track.
pub fn ansi_frame(scene: &CartpoleScene) -> String {
    let mut grid = vec![vec![' '; ANSI_WIDTH]; ANSI_HEIGHT];
    let track_row = ANSI_HEIGHT - 1;
    let cart_row = ANSI_HEIGHT - 2;

    for cell in grid[track_row].iter_mut() {
        *cell = '-';
    }

    let frac = (scene.x + scene.x_threshold) / (2.0 * scene.x_threshold);
    let cart_col = (frac * (ANSI_WIDTH - 1) as f32)
        .round()
        .clamp(2.0, (ANSI_WIDTH - 3) as f32) as usize;

    for (i, c) in "[=o=]".chars().enumerate() {
        grid[cart_row][cart_col - 2 + i] = c;
    }

    let pole_char = if scene.theta > 0.1 {
        '/'
    } else if scene.theta < -0.1 {
        '\\'
    } else {
        '|'
    };
    let (sin, cos) = scene.theta.sin_cos();
    for t in 1..=ANSI_POLE_ROWS {
        let t = t as f32;
        // terminal cells are roughly twice as tall as wide
        let col = cart_col as f32 + (t * sin * 2.0).round();
        let row = cart_row as f32 - (t * cos).round();
        if (0.0..ANSI_WIDTH as f32).contains(&col) && (0.0..cart_row as f32).contains(&row) {
            grid[row as usize][col as usize] = pole_char;
        }
    }

    let mut out = format!("x: {:+.3}  theta: {:+.3}\n", scene.x, scene.theta);
    for row in grid {
        out.extend(row);
        out.push('\n');
    }

    out
}

/// Packs an RGB frame into the `0RGB` words a minifb window expects.
pub fn rgb_to_u32(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(3)
        .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | (px[2] as u32))
        .collect()
}

enum Screen {
    Window { window: Window, buffer: Vec<u32> },
    Terminal { out: Box<dyn Write + Send>, clear: bool },
    /// The user closed the window; frames are no longer drawn.
    Closed,
}

/// Shows frames in a native window, falling back to the terminal when no
/// window can be opened. Optionally keeps every frame as a png.
pub struct HumanViewer {
    display: Screen,
    frame_dir: Option<PathBuf>,
    frame_idx: usize,
    frame_time: Duration,
    last_frame: Option<Instant>,
}

impl HumanViewer {
    pub fn new(frame_dir: Option<PathBuf>) -> Self {
        let opened = Window::new(
            "CartPole",
            SCREEN_WIDTH as usize,
            SCREEN_HEIGHT as usize,
            WindowOptions::default(),
        );

        match opened {
            Ok(window) => Self::with_display(
                Screen::Window {
                    window,
                    buffer: Vec::with_capacity((SCREEN_WIDTH * SCREEN_HEIGHT) as usize),
                },
                frame_dir,
                RENDER_FPS,
            ),
            Err(err) => {
                log::warn!("could not open a window ({err}), drawing to the terminal instead");
                let stdout = std::io::stdout();
                let clear = stdout.is_terminal();
                Self::with_display(
                    Screen::Terminal {
                        out: Box::new(stdout),
                        clear,
                    },
                    frame_dir,
                    RENDER_FPS,
                )
            }
        }
    }

    /// Text-only viewer writing to `out`. `clear` redraws in place with
    /// ANSI escapes and should only be set for a tty.
    pub fn terminal(
        out: Box<dyn Write + Send>,
        clear: bool,
        frame_dir: Option<PathBuf>,
        fps: u32,
    ) -> Self {
        Self::with_display(Screen::Terminal { out, clear }, frame_dir, fps)
    }

    fn with_display(display: Screen, frame_dir: Option<PathBuf>, fps: u32) -> Self {
        Self {
            display,
            frame_dir,
            frame_idx: 0,
            frame_time: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            last_frame: None,
        }
    }

    pub fn is_windowed(&self) -> bool {
        matches!(self.display, Screen::Window { .. })
    }

    pub fn frames_shown(&self) -> usize {
        self.frame_idx
    }

    pub fn show(&mut self, scene: &CartpoleScene) -> Result<(), EnvError> {
        if let Some(dir) = &self.frame_dir {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(render_err)?;
            }
            save_png(scene, &dir.join(format!("frame_{:06}.png", self.frame_idx)))?;
        }

        let mut window_closed = false;
        match &mut self.display {
            Screen::Window { window, buffer } => {
                if !window.is_open() || window.is_key_down(Key::Escape) {
                    window_closed = true;
                } else if let RenderFrame::Pixels {
                    width,
                    height,
                    data,
                } = rgb_frame(scene)?
                {
                    *buffer = rgb_to_u32(&data);
                    window
                        .update_with_buffer(buffer.as_slice(), width as usize, height as usize)
                        .map_err(render_err)?;
                }
            }
            Screen::Terminal { out, clear } => {
                if *clear {
                    // clear screen, cursor home
                    write!(out, "\x1b[2J\x1b[H").map_err(render_err)?;
                }
                write!(out, "{}", ansi_frame(scene)).map_err(render_err)?;
                out.flush().map_err(render_err)?;
            }
            Screen::Closed => {}
        }
        if window_closed {
            log::info!("window closed after {} frames", self.frame_idx);
            self.display = Screen::Closed;
        }

        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.frame_time {
                thread::sleep(self.frame_time - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
        self.frame_idx += 1;

        Ok(())
    }
}
