use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyboardEnhancementFlags},
    execute, queue,
    style::{self, Color as CColor},
    terminal,
};
use rand::Rng;
use std::io::{self, Write, stdout};
use std::time::{Duration, Instant};

// ── Constants ───────────────────────────────────────────────────────────────

const GAME_WIDTH: f64 = 800.0; // logical viewport, in world units
const GAME_HEIGHT: f64 = 400.0;
const GROUND_HEIGHT: f64 = 60.0;
const GROUND_Y: f64 = GAME_HEIGHT - GROUND_HEIGHT;
const PLAYER_RADIUS: f64 = 24.0;
const ENEMY_WIDTH: f64 = 32.0;
const ENEMY_HEIGHT: f64 = 40.0;
const PIT_WIDTH: f64 = 80.0;
const GRAVITY: f64 = 0.7;
const JUMP_VELOCITY: f64 = -13.0;
const STOMP_BOUNCE: f64 = 0.7;
const MOVE_SPEED: f64 = 5.0;
const LEVEL_LENGTH: f64 = 2400.0;
const CAMERA_LEAD: f64 = 200.0;
const FINISH_ZONE: f64 = 60.0;
const SPAWN_X: f64 = 60.0;
const PIT_CHANCE: f64 = 0.18;
const ENEMY_CHANCE: f64 = 0.22;
// How many ticks a movement key stays held after a press when the terminal
// cannot report key releases (plain terminals rely on autorepeat).
const HOLD_TICKS: u8 = 6;

// ── Colors ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
struct Rgb(u8, u8, u8);

impl Rgb {
    const fn lerp(a: Rgb, b: Rgb, t_256: u16) -> Rgb {
        let t = t_256 as i32;
        Rgb(
            (a.0 as i32 + (b.0 as i32 - a.0 as i32) * t / 256) as u8,
            (a.1 as i32 + (b.1 as i32 - a.1 as i32) * t / 256) as u8,
            (a.2 as i32 + (b.2 as i32 - a.2 as i32) * t / 256) as u8,
        )
    }
}

impl From<Rgb> for CColor {
    fn from(c: Rgb) -> Self {
        CColor::Rgb { r: c.0, g: c.1, b: c.2 }
    }
}

const SKY_TOP: Rgb = Rgb(125, 195, 255);
const SKY_BOT: Rgb = Rgb(179, 224, 255);
const HILL_FAR: Rgb = Rgb(135, 200, 120);
const HILL_NEAR: Rgb = Rgb(105, 180, 90);
const GRASS: Rgb = Rgb(76, 175, 80);
const GRASS_LIGHT: Rgb = Rgb(100, 195, 100);
const DIRT: Rgb = Rgb(155, 118, 83);
const DIRT_DARK: Rgb = Rgb(130, 96, 65);
const ENEMY_BODY: Rgb = Rgb(255, 136, 0);
const EYE_DARK: Rgb = Rgb(20, 20, 20);
const PLAYER_BLUE: Rgb = Rgb(30, 144, 255);
const FLAG_POLE: Rgb = Rgb(245, 245, 245);
const FLAG_RED: Rgb = Rgb(229, 57, 53);
const WHITE: Rgb = Rgb(255, 255, 255);
const BORDER: Rgb = Rgb(24, 24, 28);

fn sky_color(wy: f64) -> Rgb {
    let t = ((wy / GAME_HEIGHT) * 256.0).clamp(0.0, 256.0) as u16;
    Rgb::lerp(SKY_TOP, SKY_BOT, t)
}

// ── Pixel buffer with half-block rendering ──────────────────────────────────

struct PixelBuf {
    w: usize,
    h: usize, // pixel height = terminal rows * 2
    px: Vec<Rgb>,
}

impl PixelBuf {
    fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            px: vec![BORDER; w * h],
        }
    }

    fn resize(&mut self, w: usize, h: usize) {
        self.w = w;
        self.h = h;
        self.px.resize(w * h, BORDER);
    }

    fn set(&mut self, x: i32, y: i32, c: Rgb) {
        if x >= 0 && y >= 0 && (x as usize) < self.w && (y as usize) < self.h {
            self.px[y as usize * self.w + x as usize] = c;
        }
    }

    fn get(&self, x: usize, y: usize) -> Rgb {
        self.px[y * self.w + x]
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, c: Rgb) {
        for dy in 0..h {
            for dx in 0..w {
                self.set(x + dx, y + dy, c);
            }
        }
    }

    fn fill_circle(&mut self, cx: i32, cy: i32, r: i32, c: Rgb) {
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.set(cx + dx, cy + dy, c);
                }
            }
        }
    }

    // Each terminal cell carries two vertical pixels via '▀'; colors are
    // cached so the escape stream stays small.
    fn render(&self, out: &mut impl Write) -> io::Result<()> {
        queue!(out, cursor::MoveTo(0, 0))?;
        let rows = self.h / 2;
        let mut fg: Option<Rgb> = None;
        let mut bg: Option<Rgb> = None;

        for row in 0..rows {
            for col in 0..self.w {
                let top = self.get(col, row * 2);
                let bot = self.get(col, row * 2 + 1);

                if top == bot {
                    if bg != Some(top) {
                        queue!(out, style::SetBackgroundColor(top.into()))?;
                        bg = Some(top);
                    }
                    queue!(out, style::Print(' '))?;
                } else {
                    if fg != Some(top) {
                        queue!(out, style::SetForegroundColor(top.into()))?;
                        fg = Some(top);
                    }
                    if bg != Some(bot) {
                        queue!(out, style::SetBackgroundColor(bot.into()))?;
                        bg = Some(bot);
                    }
                    queue!(out, style::Print('\u{2580}'))?;
                }
            }
            if row + 1 < rows {
                queue!(out, style::ResetColor, style::Print("\r\n"))?;
                fg = None;
                bg = None;
            }
        }
        queue!(out, style::ResetColor)?;
        Ok(())
    }
}

// ── Viewport mapping ────────────────────────────────────────────────────────

// The 800x400 logical viewport is scaled uniformly into the pixel buffer
// and letterboxed when the aspect ratios differ.
#[derive(Clone, Copy)]
struct View {
    scale: f64,
    off_x: i32,
    off_y: i32,
}

impl View {
    fn fit(pw: usize, ph: usize) -> Self {
        let scale = (pw as f64 / GAME_WIDTH)
            .min(ph as f64 / GAME_HEIGHT)
            .max(0.01);
        View {
            scale,
            off_x: ((pw as f64 - GAME_WIDTH * scale) / 2.0) as i32,
            off_y: ((ph as f64 - GAME_HEIGHT * scale) / 2.0) as i32,
        }
    }

    fn px(&self, wx: f64) -> i32 {
        self.off_x + (wx * self.scale).floor() as i32
    }

    fn py(&self, wy: f64) -> i32 {
        self.off_y + (wy * self.scale).floor() as i32
    }

    fn len(&self, w: f64) -> i32 {
        ((w * self.scale) as i32).max(1)
    }

    fn view_w(&self) -> i32 {
        (GAME_WIDTH * self.scale) as i32
    }

    fn view_h(&self) -> i32 {
        (GAME_HEIGHT * self.scale) as i32
    }
}

// ── Level generation ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
struct Pit {
    x: f64,
    width: f64,
}

#[derive(Clone, Copy, Debug)]
struct Enemy {
    x: f64,
    y: f64,
    alive: bool,
}

#[derive(Clone, Debug)]
struct Level {
    pits: Vec<Pit>,
    enemies: Vec<Enemy>,
}

// Sweeps a cursor down the track, rolling for a pit first and an enemy only
// when no pit was placed. The cursor starts well past the spawn point, and
// nothing may intrude into the finish zone.
fn generate_level(rng: &mut impl Rng) -> Level {
    let mut pits = Vec::new();
    let mut enemies = Vec::new();
    let fair_end = LEVEL_LENGTH - FINISH_ZONE;
    let mut x = 200.0;

    while x < LEVEL_LENGTH - 100.0 {
        if rng.random_bool(PIT_CHANCE) {
            let width = PIT_WIDTH + rng.random_range(0.0..40.0);
            if x + width <= fair_end {
                pits.push(Pit { x, width });
                x += width + 100.0 + rng.random_range(0.0..100.0);
                continue;
            }
        } else if rng.random_bool(ENEMY_CHANCE) && x + ENEMY_WIDTH <= fair_end {
            enemies.push(Enemy {
                x,
                y: GROUND_Y - ENEMY_HEIGHT,
                alive: true,
            });
        }
        x += 120.0 + rng.random_range(0.0..120.0);
    }

    Level { pits, enemies }
}

// ── Simulation ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Playing,
    Dead,
    Win,
}

#[derive(Clone, Copy, Debug)]
struct Player {
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    on_ground: bool,
}

impl Player {
    fn spawn() -> Self {
        Player {
            x: SPAWN_X,
            y: GROUND_Y - PLAYER_RADIUS,
            vx: 0.0,
            vy: 0.0,
            on_ground: false,
        }
    }
}

// Held-key state written by the input listener and read once per tick. On
// terminals without key-release reporting, presses arm a countdown that the
// tick loop decays, approximating a held key through autorepeat.
#[derive(Default)]
struct Intent {
    left: bool,
    right: bool,
    jump_held: bool,
    left_ttl: u8,
    right_ttl: u8,
    has_release_events: bool,
}

impl Intent {
    fn hold_left(&mut self, down: bool) {
        self.left = down;
        if down && !self.has_release_events {
            self.left_ttl = HOLD_TICKS;
        }
    }

    fn hold_right(&mut self, down: bool) {
        self.right = down;
        if down && !self.has_release_events {
            self.right_ttl = HOLD_TICKS;
        }
    }

    fn expire(&mut self) {
        if self.has_release_events {
            return;
        }
        if self.left_ttl > 0 {
            self.left_ttl -= 1;
            if self.left_ttl == 0 {
                self.left = false;
            }
        }
        if self.right_ttl > 0 {
            self.right_ttl -= 1;
            if self.right_ttl == 0 {
                self.right = false;
            }
        }
    }
}

struct Game {
    level: Level,
    player: Player,
    camera_x: f64,
    state: State,
    intent: Intent,
}

fn camera_offset(player_x: f64) -> f64 {
    (player_x - CAMERA_LEAD)
        .max(0.0)
        .min(LEVEL_LENGTH - GAME_WIDTH)
}

#[allow(clippy::too_many_arguments)]
fn rects_overlap(ax: f64, ay: f64, aw: f64, ah: f64, bx: f64, by: f64, bw: f64, bh: f64) -> bool {
    ax < bx + bw && ax + aw > bx && ay < by + bh && ay + ah > by
}

impl Game {
    fn new(rng: &mut impl Rng, has_release_events: bool) -> Self {
        Game {
            level: generate_level(rng),
            player: Player::spawn(),
            camera_x: 0.0,
            state: State::Playing,
            intent: Intent {
                has_release_events,
                ..Intent::default()
            },
        }
    }

    fn reset(&mut self, rng: &mut impl Rng) {
        self.level = generate_level(rng);
        self.player = Player::spawn();
        self.camera_x = 0.0;
        self.state = State::Playing;
    }

    fn handle_key(&mut self, code: KeyCode, kind: KeyEventKind, rng: &mut impl Rng) {
        match (code, kind) {
            (KeyCode::Left, k) => self.intent.hold_left(k != KeyEventKind::Release),
            (KeyCode::Right, k) => self.intent.hold_right(k != KeyEventKind::Release),
            (KeyCode::Char(' '), KeyEventKind::Press) => {
                // Edge-triggered jump. The grounded guard keeps airborne
                // presses inert; jump_held keeps a held key from re-firing
                // on landing where releases are reported.
                if !self.intent.jump_held && self.player.on_ground && self.state == State::Playing
                {
                    self.player.vy = JUMP_VELOCITY;
                }
                if self.intent.has_release_events {
                    self.intent.jump_held = true;
                }
            }
            (KeyCode::Char(' '), KeyEventKind::Release) => self.intent.jump_held = false,
            (KeyCode::Char('r') | KeyCode::Char('R') | KeyCode::Enter, KeyEventKind::Press) => {
                if self.state != State::Playing {
                    self.reset(rng);
                }
            }
            _ => {}
        }
    }

    // One fixed timestep: intent, gravity, Euler step, ground support,
    // clamp, camera, fall death, enemies, win. A no-op once dead/won.
    fn update(&mut self) {
        if self.state != State::Playing {
            return;
        }
        self.intent.expire();

        let p = &mut self.player;
        p.vx = if self.intent.left {
            -MOVE_SPEED
        } else if self.intent.right {
            MOVE_SPEED
        } else {
            0.0
        };
        p.vy += GRAVITY;
        p.x += p.vx;
        p.y += p.vy;

        let over_pit = self
            .level
            .pits
            .iter()
            .any(|pit| p.x + PLAYER_RADIUS > pit.x && p.x - PLAYER_RADIUS < pit.x + pit.width);
        if !over_pit && p.y > GROUND_Y - PLAYER_RADIUS {
            p.y = GROUND_Y - PLAYER_RADIUS;
            p.vy = 0.0;
            p.on_ground = true;
        } else {
            p.on_ground = false;
        }

        if p.x < 0.0 {
            p.x = 0.0;
        }

        self.camera_x = camera_offset(p.x);

        if p.y - PLAYER_RADIUS > GAME_HEIGHT {
            self.state = State::Dead;
            return;
        }

        for enemy in &mut self.level.enemies {
            if !enemy.alive {
                continue;
            }
            if rects_overlap(
                p.x - PLAYER_RADIUS,
                p.y - PLAYER_RADIUS,
                PLAYER_RADIUS * 2.0,
                PLAYER_RADIUS * 2.0,
                enemy.x,
                enemy.y,
                ENEMY_WIDTH,
                ENEMY_HEIGHT,
            ) {
                if p.vy > 0.0 && p.y < enemy.y {
                    // Stomped from above.
                    enemy.alive = false;
                    p.vy = JUMP_VELOCITY * STOMP_BOUNCE;
                } else {
                    self.state = State::Dead;
                    return;
                }
            }
        }

        if p.x > LEVEL_LENGTH - FINISH_ZONE {
            self.state = State::Win;
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────────────

impl Game {
    fn draw(&self, buf: &mut PixelBuf, view: View) {
        buf.fill_rect(0, 0, buf.w as i32, buf.h as i32, BORDER);
        self.draw_sky(buf, view);
        self.draw_hills(buf, view);
        self.draw_ground(buf, view);
        self.draw_pits(buf, view);
        self.draw_enemies(buf, view);
        self.draw_player(buf, view);
        self.draw_flag(buf, view);
        if self.state != State::Playing {
            dim(buf);
        }
    }

    fn draw_sky(&self, buf: &mut PixelBuf, view: View) {
        for sy in view.off_y..view.off_y + view.view_h() {
            let wy = (sy - view.off_y) as f64 / view.scale;
            let c = sky_color(wy);
            for sx in view.off_x..view.off_x + view.view_w() {
                buf.set(sx, sy, c);
            }
        }
    }

    fn draw_hills(&self, buf: &mut PixelBuf, view: View) {
        let base = view.py(GROUND_Y);
        for sx in view.off_x..view.off_x + view.view_w() {
            let wx = (sx - view.off_x) as f64 / view.scale;

            let far = wx + self.camera_x * 0.3;
            let h = ((far * 0.013).sin() * 16.0 + (far * 0.031).sin() * 8.0 + 30.0) * view.scale;
            for sy in base - h as i32..base {
                buf.set(sx, sy, HILL_FAR);
            }

            let near = wx + self.camera_x * 0.6;
            let h = ((near * 0.021).sin() * 10.0 + (near * 0.047).sin() * 5.0 + 16.0) * view.scale;
            for sy in base - h as i32..base {
                buf.set(sx, sy, HILL_NEAR);
            }
        }
    }

    fn draw_ground(&self, buf: &mut PixelBuf, view: View) {
        let gy = view.py(GROUND_Y);
        let bottom = view.off_y + view.view_h();
        let grass_bottom = view.py(GROUND_Y + 10.0);
        for sy in gy..bottom {
            for sx in view.off_x..view.off_x + view.view_w() {
                let wx = (sx - view.off_x) as f64 / view.scale + self.camera_x;
                let c = if sy < grass_bottom {
                    if (wx / 24.0) as i64 % 2 == 0 {
                        GRASS
                    } else {
                        GRASS_LIGHT
                    }
                } else {
                    let band = ((sy - gy) as f64 / view.scale / 12.0) as i64;
                    if ((wx / 16.0) as i64 + band) % 2 == 0 {
                        DIRT
                    } else {
                        DIRT_DARK
                    }
                };
                buf.set(sx, sy, c);
            }
        }
    }

    // Pits are cut out of the ground strip; the sky gradient continues down
    // through the gap.
    fn draw_pits(&self, buf: &mut PixelBuf, view: View) {
        let gy = view.py(GROUND_Y);
        let bottom = view.off_y + view.view_h();
        for pit in &self.level.pits {
            let wx = pit.x - self.camera_x;
            if wx + pit.width < 0.0 || wx > GAME_WIDTH {
                continue;
            }
            let sx0 = view.px(wx).max(view.off_x);
            let sx1 = view.px(wx + pit.width).min(view.off_x + view.view_w());
            for sy in gy..bottom {
                let wy = (sy - view.off_y) as f64 / view.scale;
                let c = sky_color(wy);
                for sx in sx0..sx1 {
                    buf.set(sx, sy, c);
                }
            }
        }
    }

    fn draw_enemies(&self, buf: &mut PixelBuf, view: View) {
        for enemy in self.level.enemies.iter().filter(|e| e.alive) {
            let wx = enemy.x - self.camera_x;
            if wx + ENEMY_WIDTH < 0.0 || wx > GAME_WIDTH {
                continue;
            }
            let x0 = view.px(wx);
            let y0 = view.py(enemy.y);
            let w = view.len(ENEMY_WIDTH);
            let h = view.len(ENEMY_HEIGHT);
            let apex = x0 + w / 2;

            for dy in 0..h {
                let half = (dy as f64 / h as f64 * w as f64 / 2.0) as i32;
                for dx in -half..=half {
                    buf.set(apex + dx, y0 + dy, ENEMY_BODY);
                }
            }

            let eye_y = y0 + h - view.len(10.0);
            let eye_r = view.len(3.0);
            buf.fill_circle(apex, eye_y, eye_r, WHITE);
            let off = view.len(2.0);
            buf.set(apex - off, eye_y, EYE_DARK);
            buf.set(apex + off, eye_y, EYE_DARK);
        }
    }

    fn draw_player(&self, buf: &mut PixelBuf, view: View) {
        let cx = view.px(self.player.x - self.camera_x);
        let cy = view.py(self.player.y);
        let r = (PLAYER_RADIUS * view.scale).max(2.0);
        let ri = r.ceil() as i32;
        let rim = (r - 2.0 * view.scale).max(1.0);

        for dy in -ri..=ri {
            for dx in -ri..=ri {
                let d = ((dx * dx + dy * dy) as f64).sqrt();
                if d > r {
                    continue;
                }
                buf.set(cx + dx, cy + dy, if d > rim { WHITE } else { PLAYER_BLUE });
            }
        }

        // Rolling seams: two perpendicular diameters rotating with travel.
        let theta = self.player.x / PLAYER_RADIUS;
        for k in 0..2 {
            let a = theta + k as f64 * std::f64::consts::FRAC_PI_2;
            let (ux, uy) = (a.cos(), a.sin());
            let reach = rim - 1.0;
            let mut t = -reach;
            while t <= reach {
                buf.set(
                    cx + (ux * t).round() as i32,
                    cy + (uy * t).round() as i32,
                    WHITE,
                );
                t += 0.5;
            }
        }
    }

    fn draw_flag(&self, buf: &mut PixelBuf, view: View) {
        let wx = LEVEL_LENGTH - 30.0 - self.camera_x;
        if wx > GAME_WIDTH {
            return;
        }
        buf.fill_rect(
            view.px(wx),
            view.py(GROUND_Y - 60.0),
            view.len(8.0),
            view.len(60.0),
            FLAG_POLE,
        );
        buf.fill_rect(
            view.px(wx + 8.0),
            view.py(GROUND_Y - 60.0),
            view.len(14.0),
            view.len(14.0),
            FLAG_RED,
        );
    }
}

fn dim(buf: &mut PixelBuf) {
    for y in 0..buf.h {
        for x in 0..buf.w {
            let c = buf.get(x, y);
            buf.set(x as i32, y as i32, Rgb(c.0 / 2, c.1 / 2, c.2 / 2));
        }
    }
}

fn draw_messages(out: &mut impl Write, game: &Game, cols: u16, rows: u16) -> io::Result<()> {
    let legend = "Left/Right = move   Space = jump   R/Enter = restart   Q = quit";
    let col = cols.saturating_sub(legend.chars().count() as u16) / 2;
    queue!(
        out,
        cursor::MoveTo(col, rows.saturating_sub(1)),
        style::SetForegroundColor(CColor::DarkGrey),
        style::Print(legend),
        style::ResetColor,
    )?;

    let msg = match game.state {
        State::Playing => None,
        State::Dead => Some(("Game over! Press R or Enter to restart.", CColor::Red)),
        State::Win => Some(("You win! Press R or Enter to play again.", CColor::Green)),
    };
    if let Some((text, color)) = msg {
        let col = cols.saturating_sub(text.chars().count() as u16) / 2;
        queue!(
            out,
            cursor::MoveTo(col, rows / 2),
            style::SetForegroundColor(color),
            style::SetAttribute(style::Attribute::Bold),
            style::Print(text),
            style::SetAttribute(style::Attribute::Reset),
            style::ResetColor,
        )?;
    }
    Ok(())
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut out = stdout();
    execute!(
        out,
        terminal::EnterAlternateScreen,
        cursor::Hide,
        terminal::DisableLineWrap,
    )?;

    // Key releases only arrive where the kitty keyboard protocol is
    // available; everywhere else held movement falls back to autorepeat.
    let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
    if enhanced {
        execute!(
            out,
            event::PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES),
        )?;
    }

    let cleanup = |out: &mut io::Stdout, enhanced: bool| -> io::Result<()> {
        if enhanced {
            execute!(out, event::PopKeyboardEnhancementFlags)?;
        }
        execute!(
            out,
            terminal::LeaveAlternateScreen,
            cursor::Show,
            terminal::EnableLineWrap,
        )?;
        terminal::disable_raw_mode()
    };

    let (mut cols, mut rows) = terminal::size()?;
    // The bottom terminal row is reserved for the control legend.
    let mut buf = PixelBuf::new(cols as usize, rows.saturating_sub(1).max(1) as usize * 2);
    let mut view = View::fit(buf.w, buf.h);

    let mut rng = rand::rng();
    let mut game = Game::new(&mut rng, enhanced);

    let frame_dur = Duration::from_millis(16); // ~60 fps, matching the physics constants

    loop {
        let frame_start = Instant::now();

        // Input
        while event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key) => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc if key.kind == KeyEventKind::Press => {
                        cleanup(&mut out, enhanced)?;
                        return Ok(());
                    }
                    code => game.handle_key(code, key.kind, &mut rng),
                },
                Event::Resize(c, r) => {
                    cols = c;
                    rows = r;
                    buf.resize(cols as usize, rows.saturating_sub(1).max(1) as usize * 2);
                    view = View::fit(buf.w, buf.h);
                }
                _ => {}
            }
        }

        // Update (a no-op once dead/won; the terminal frame keeps rendering)
        game.update();

        // Render, skipped while the terminal is too small to hold a frame
        if buf.w >= 16 && buf.h >= 16 {
            game.draw(&mut buf, view);
            buf.render(&mut out)?;
            draw_messages(&mut out, &game, cols, rows)?;
        }
        out.flush()?;

        // Frame pacing
        let elapsed = frame_start.elapsed();
        if elapsed < frame_dur {
            std::thread::sleep(frame_dur - elapsed);
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn empty_level() -> Level {
        Level {
            pits: Vec::new(),
            enemies: Vec::new(),
        }
    }

    fn playing(level: Level) -> Game {
        Game {
            level,
            player: Player::spawn(),
            camera_x: 0.0,
            state: State::Playing,
            intent: Intent {
                has_release_events: true,
                ..Intent::default()
            },
        }
    }

    fn ground_enemy(x: f64) -> Enemy {
        Enemy {
            x,
            y: GROUND_Y - ENEMY_HEIGHT,
            alive: true,
        }
    }

    fn assert_level_valid(level: &Level) {
        for pit in &level.pits {
            assert!(pit.x >= 0.0, "pit starts before the track");
            assert!(
                pit.x + pit.width <= LEVEL_LENGTH - FINISH_ZONE,
                "pit intrudes into the finish zone"
            );
            assert!(
                pit.x > SPAWN_X + PLAYER_RADIUS || pit.x + pit.width < SPAWN_X - PLAYER_RADIUS,
                "pit overlaps the spawn point"
            );
        }
        for pair in level.pits.windows(2) {
            assert!(
                pair[0].x + pair[0].width < pair[1].x,
                "pits overlap or touch"
            );
        }
        for enemy in &level.enemies {
            assert!(enemy.x >= 0.0);
            assert!(enemy.x + ENEMY_WIDTH <= LEVEL_LENGTH - FINISH_ZONE);
            assert_eq!(enemy.y, GROUND_Y - ENEMY_HEIGHT);
            assert!(enemy.alive);
        }
    }

    #[test]
    fn generated_levels_keep_their_invariants() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            assert_level_valid(&generate_level(&mut rng));
        }
    }

    #[test]
    fn grounded_player_sticks_to_ground() {
        let mut g = playing(empty_level());
        g.update();
        assert!(g.player.on_ground);
        assert_eq!(g.player.vy, 0.0);
        assert_eq!(g.player.y, GROUND_Y - PLAYER_RADIUS);
    }

    #[test]
    fn player_over_pit_freefalls_to_death() {
        let mut g = playing(Level {
            pits: vec![Pit { x: 0.0, width: 400.0 }],
            enemies: Vec::new(),
        });
        while g.state == State::Playing {
            g.update();
            assert!(!g.player.on_ground, "must never land while over a pit");
        }
        assert_eq!(g.state, State::Dead);
        assert!(g.player.y - PLAYER_RADIUS > GAME_HEIGHT);
    }

    #[test]
    fn fall_death_triggers_just_past_the_lower_bound() {
        // vy starts at -GRAVITY so the integration step leaves y unchanged.
        let mut g = playing(Level {
            pits: vec![Pit { x: 0.0, width: 400.0 }],
            enemies: Vec::new(),
        });
        g.player.y = GAME_HEIGHT + PLAYER_RADIUS;
        g.player.vy = -GRAVITY;
        g.update();
        assert_eq!(g.state, State::Playing, "exactly at the bound is alive");

        let mut g = playing(Level {
            pits: vec![Pit { x: 0.0, width: 400.0 }],
            enemies: Vec::new(),
        });
        g.player.y = GAME_HEIGHT + PLAYER_RADIUS + 1.0;
        g.player.vy = -GRAVITY;
        g.update();
        assert_eq!(g.state, State::Dead);
    }

    #[test]
    fn stomp_kills_enemy_and_bounces() {
        let mut g = playing(Level {
            pits: Vec::new(),
            enemies: vec![ground_enemy(100.0)],
        });
        g.player.x = 110.0;
        g.player.y = 288.0;
        g.player.vy = 0.7; // descending once gravity is applied
        g.update();
        assert!(!g.level.enemies[0].alive);
        assert_eq!(g.state, State::Playing);
        assert_eq!(g.player.vy, JUMP_VELOCITY * STOMP_BOUNCE);
    }

    #[test]
    fn side_collision_kills_player() {
        // Overlapping but ascending: not a stomp.
        let mut g = playing(Level {
            pits: Vec::new(),
            enemies: vec![ground_enemy(100.0)],
        });
        g.player.x = 110.0;
        g.player.y = 310.0;
        g.player.vy = -2.0;
        g.update();
        assert!(g.level.enemies[0].alive);
        assert_eq!(g.state, State::Dead);

        // Descending but not above the enemy's top: still lethal.
        let mut g = playing(Level {
            pits: Vec::new(),
            enemies: vec![ground_enemy(100.0)],
        });
        g.player.x = 110.0;
        g.player.y = 310.0;
        g.player.vy = 0.7;
        g.update();
        assert!(g.level.enemies[0].alive);
        assert_eq!(g.state, State::Dead);
    }

    #[test]
    fn win_boundary_is_sixty_units_before_the_end() {
        let mut g = playing(empty_level());
        g.player.x = LEVEL_LENGTH - 61.0;
        g.update();
        assert_eq!(g.state, State::Playing);

        let mut g = playing(empty_level());
        g.player.x = LEVEL_LENGTH - 59.0;
        g.update();
        assert_eq!(g.state, State::Win);
    }

    #[test]
    fn camera_clamps_at_both_ends() {
        assert_eq!(camera_offset(0.0), 0.0);
        assert_eq!(camera_offset(500.0), 300.0);
        assert_eq!(camera_offset(LEVEL_LENGTH), LEVEL_LENGTH - GAME_WIDTH);
    }

    #[test]
    fn reset_respawns_player_and_regenerates_level() {
        let mut rng = rand::rng();
        let mut g = Game::new(&mut rng, true);
        for _ in 0..3 {
            g.state = State::Dead;
            g.player.x = 1234.0;
            g.player.vy = 9.0;
            g.camera_x = 700.0;
            g.handle_key(KeyCode::Char('r'), KeyEventKind::Press, &mut rng);
            assert_eq!(g.state, State::Playing);
            assert_eq!(g.player.x, SPAWN_X);
            assert_eq!(g.player.vx, 0.0);
            assert_eq!(g.player.vy, 0.0);
            assert!(!g.player.on_ground);
            assert_eq!(g.camera_x, 0.0);
            assert_level_valid(&g.level);
        }
        // Enter works too, from the win screen.
        g.state = State::Win;
        g.handle_key(KeyCode::Enter, KeyEventKind::Press, &mut rng);
        assert_eq!(g.state, State::Playing);
    }

    #[test]
    fn reset_is_ignored_while_playing() {
        let mut rng = rand::rng();
        let mut g = Game::new(&mut rng, true);
        g.player.x = 500.0;
        g.handle_key(KeyCode::Char('r'), KeyEventKind::Press, &mut rng);
        g.handle_key(KeyCode::Enter, KeyEventKind::Press, &mut rng);
        assert_eq!(g.state, State::Playing);
        assert_eq!(g.player.x, 500.0);
    }

    #[test]
    fn jump_requires_ground_and_release_to_refire() {
        let mut rng = rand::rng();
        let mut g = playing(empty_level());
        g.update(); // settle onto the ground
        assert!(g.player.on_ground);

        g.handle_key(KeyCode::Char(' '), KeyEventKind::Press, &mut rng);
        assert_eq!(g.player.vy, JUMP_VELOCITY);
        assert!(g.intent.jump_held);

        // Airborne press does nothing.
        g.update();
        assert!(!g.player.on_ground);
        let vy = g.player.vy;
        g.handle_key(KeyCode::Char(' '), KeyEventKind::Press, &mut rng);
        assert_eq!(g.player.vy, vy);

        // Held across the landing: still suppressed until released.
        while !g.player.on_ground {
            g.update();
        }
        g.handle_key(KeyCode::Char(' '), KeyEventKind::Press, &mut rng);
        assert_eq!(g.player.vy, 0.0);
        g.handle_key(KeyCode::Char(' '), KeyEventKind::Release, &mut rng);
        g.handle_key(KeyCode::Char(' '), KeyEventKind::Press, &mut rng);
        assert_eq!(g.player.vy, JUMP_VELOCITY);
    }

    #[test]
    fn jump_is_ignored_when_not_playing() {
        let mut rng = rand::rng();
        let mut g = playing(empty_level());
        g.update();
        g.state = State::Dead;
        g.handle_key(KeyCode::Char(' '), KeyEventKind::Press, &mut rng);
        assert_eq!(g.player.vy, 0.0);
    }

    #[test]
    fn left_intent_takes_priority() {
        let mut g = playing(empty_level());
        g.intent.left = true;
        g.intent.right = true;
        g.update();
        assert_eq!(g.player.vx, -MOVE_SPEED);
    }

    #[test]
    fn held_movement_decays_without_release_events() {
        let mut g = playing(empty_level());
        g.intent.has_release_events = false;
        g.intent.hold_right(true);
        assert!(g.intent.right);
        for _ in 0..HOLD_TICKS {
            g.update();
        }
        assert!(!g.intent.right);
        assert_eq!(g.player.vx, 0.0);
    }

    proptest! {
        #[test]
        fn camera_offset_stays_within_the_track(x in -1000.0f64..4000.0) {
            let off = camera_offset(x);
            prop_assert!(off >= 0.0);
            prop_assert!(off <= LEVEL_LENGTH - GAME_WIDTH);
        }

        #[test]
        fn grounded_tick_always_zeroes_vertical_velocity(x in 0.0f64..LEVEL_LENGTH) {
            let mut g = playing(empty_level());
            g.player.x = x;
            g.player.y = GROUND_Y - PLAYER_RADIUS;
            g.update();
            prop_assert!(g.player.on_ground);
            prop_assert_eq!(g.player.vy, 0.0);
        }
    }
}
