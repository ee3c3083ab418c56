pub mod input;
pub mod terminal;

pub use input::Input;

use crate::git::types::{Divergence, FileChange, Snapshot, StatusCode};
use ratatui::backend::Backend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Padding, Paragraph};
use ratatui::Terminal;
use std::io;

const BANNER: [&str; 2] = [" █░█ █ █▀▀ █ █░░", " ▀▄▀ █ █▄█ █ █▄▄"];
const FOOTER: &str = "Watching for changes... q quit · j/k scroll · r refresh";
const FOOTER_HEIGHT: u16 = 2;

fn fg(index: u8) -> Style {
    Style::default().fg(Color::Indexed(index))
}

fn status_style(staged: StatusCode, unstaged: StatusCode) -> Style {
    let has = |code: StatusCode| staged == code || unstaged == code;
    if has(StatusCode::Modified) {
        fg(214)
    } else if has(StatusCode::Added) {
        fg(42)
    } else if has(StatusCode::Deleted) {
        fg(196)
    } else if has(StatusCode::Renamed) {
        fg(39)
    } else if staged == StatusCode::Untracked && unstaged == StatusCode::Untracked {
        fg(245)
    } else {
        Style::default()
    }
}

pub fn divergence_label(divergence: &Divergence) -> String {
    match divergence {
        Divergence::Pending => "checking upstream…".to_string(),
        Divergence::NoUpstream => "no upstream".to_string(),
        Divergence::Tracking {
            ahead: 0,
            behind: 0,
        } => "up to date".to_string(),
        Divergence::Tracking { ahead, behind } => format!("↑{} ↓{}", ahead, behind),
    }
}

fn header_lines(workdir: &str, snapshot: &Snapshot) -> Vec<Line<'static>> {
    let banner = fg(205).add_modifier(Modifier::BOLD);
    let mut lines: Vec<Line<'static>> = BANNER
        .iter()
        .map(|row| Line::from(Span::styled(*row, banner)))
        .collect();
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(workdir.to_string(), fg(245))));
    lines.push(Line::default());
    lines.push(Line::from(vec![
        Span::raw("Branch: "),
        Span::styled(
            snapshot.branch.clone(),
            fg(42).add_modifier(Modifier::BOLD),
        ),
    ]));
    lines.push(Line::from(vec![
        Span::raw("Upstream: "),
        Span::styled(divergence_label(&snapshot.divergence), fg(245)),
    ]));
    lines.push(Line::default());
    lines
}

fn change_line(change: &FileChange) -> Line<'static> {
    let path = match &change.orig_path {
        Some(orig) => format!("{} -> {}", orig, change.path),
        None => change.path.clone(),
    };
    Line::from(vec![
        Span::raw("  "),
        Span::styled(
            change.code(),
            status_style(change.staged, change.unstaged),
        ),
        Span::raw(" "),
        Span::styled(path, fg(252)),
        Span::styled(format!("  {}", change.label), fg(241)),
    ])
}

fn body_lines(snapshot: &Snapshot) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if snapshot.changes.is_empty() {
        lines.push(Line::from(Span::styled("No changes detected", fg(241))));
    } else {
        lines.push(Line::from("Changed Files:"));
        lines.extend(snapshot.changes.iter().map(change_line));
    }

    if !snapshot.branch_files.is_empty() {
        let base = snapshot.default_branch.as_deref().unwrap_or("default branch");
        lines.push(Line::default());
        lines.push(Line::from(format!("Branch changes vs {}:", base)));
        for file in &snapshot.branch_files {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(
                    format!("{:<2}", file.status.as_char()),
                    status_style(file.status, StatusCode::Unmodified),
                ),
                Span::raw(" "),
                Span::styled(file.path.clone(), fg(252)),
            ]));
        }
    }
    lines
}

/// Draws snapshots into a terminal and owns the scroll position of the
/// file list. The offset survives new snapshots and is only pulled back
/// when the content gets shorter than it.
pub struct Dashboard<B: Backend> {
    terminal: Terminal<B>,
    workdir: String,
    scroll: u16,
    max_scroll: u16,
}

impl<B: Backend> Dashboard<B> {
    pub fn new(terminal: Terminal<B>, workdir: String) -> Self {
        Self {
            terminal,
            workdir,
            scroll: 0,
            max_scroll: 0,
        }
    }

    pub fn scroll(&self) -> u16 {
        self.scroll
    }

    #[cfg(test)]
    fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    pub fn scroll_by(&mut self, delta: i32) {
        let next = (i32::from(self.scroll) + delta).clamp(0, i32::from(self.max_scroll));
        self.scroll = u16::try_from(next).unwrap_or(0);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll;
    }

    pub fn draw(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let header = header_lines(&self.workdir, snapshot);
        let body = body_lines(snapshot);
        let header_height = u16::try_from(header.len()).unwrap_or(u16::MAX);
        let body_height = u16::try_from(body.len()).unwrap_or(u16::MAX);

        let scroll = &mut self.scroll;
        let max_scroll = &mut self.max_scroll;
        self.terminal.draw(|frame| {
            let [header_area, body_area, footer_area] = Layout::vertical([
                Constraint::Length(header_height),
                Constraint::Min(0),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .areas(frame.area());

            *max_scroll = body_height.saturating_sub(body_area.height);
            *scroll = (*scroll).min(*max_scroll);

            frame.render_widget(Paragraph::new(header), header_area);
            frame.render_widget(
                Paragraph::new(body)
                    .block(Block::new().padding(Padding::horizontal(2)))
                    .scroll((*scroll, 0)),
                body_area,
            );
            frame.render_widget(
                Paragraph::new(vec![
                    Line::default(),
                    Line::from(Span::styled(FOOTER, fg(241))),
                ]),
                footer_area,
            );
        })?;
        Ok(())
    }

    /// Clears the screen before drawing so nothing from the previous frame
    /// survives.
    pub fn repaint(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.terminal.clear()?;
        self.draw(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::types::BranchFileDiff;
    use ratatui::backend::TestBackend;

    fn dashboard(width: u16, height: u16) -> Dashboard<TestBackend> {
        let terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        Dashboard::new(terminal, "/work/repo".to_string())
    }

    fn text(dashboard: &Dashboard<TestBackend>) -> String {
        let buffer = dashboard.terminal().backend().buffer();
        buffer
            .content
            .chunks(usize::from(buffer.area.width))
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn change(path: &str) -> FileChange {
        FileChange {
            staged: StatusCode::Modified,
            unstaged: StatusCode::Unmodified,
            label: "modified (staged)".to_string(),
            path: path.to_string(),
            orig_path: None,
        }
    }

    fn snapshot_with(count: usize) -> Snapshot {
        Snapshot {
            branch: "feature".to_string(),
            changes: (0..count).map(|i| change(&format!("file{}.rs", i))).collect(),
            ..Snapshot::default()
        }
    }

    #[test]
    fn labels_divergence_states() {
        assert_eq!(divergence_label(&Divergence::NoUpstream), "no upstream");
        assert_eq!(
            divergence_label(&Divergence::Tracking {
                ahead: 0,
                behind: 0
            }),
            "up to date"
        );
        assert_eq!(
            divergence_label(&Divergence::Tracking {
                ahead: 2,
                behind: 5
            }),
            "↑2 ↓5"
        );
    }

    #[test]
    fn renders_header_changes_and_branch_files() {
        let mut dashboard = dashboard(80, 30);
        let snapshot = Snapshot {
            branch_files: vec![BranchFileDiff {
                status: StatusCode::Added,
                path: "src/new.rs".to_string(),
            }],
            default_branch: Some("main".to_string()),
            divergence: Divergence::NoUpstream,
            ..snapshot_with(1)
        };
        dashboard.draw(&snapshot).unwrap();

        let screen = text(&dashboard);
        assert!(screen.contains("/work/repo"));
        assert!(screen.contains("Branch: feature"));
        assert!(screen.contains("Upstream: no upstream"));
        assert!(screen.contains("M  file0.rs  modified (staged)"));
        assert!(screen.contains("Branch changes vs main:"));
        assert!(screen.contains("A  src/new.rs"));
        assert!(screen.contains("Watching for changes..."));
    }

    #[test]
    fn renders_empty_state() {
        let mut dashboard = dashboard(80, 20);
        dashboard.draw(&Snapshot::default()).unwrap();
        let screen = text(&dashboard);
        assert!(screen.contains("No changes detected"));
        assert!(!screen.contains("Branch changes vs"));
    }

    #[test]
    fn scroll_survives_refresh_until_content_shrinks() {
        // 20 rows: 8 header, 2 footer, 10 body.
        let mut dashboard = dashboard(60, 20);
        let long = snapshot_with(30);
        dashboard.draw(&long).unwrap();

        dashboard.scroll_by(5);
        dashboard.draw(&long.clone()).unwrap();
        assert_eq!(dashboard.scroll(), 5);
        assert!(text(&dashboard).contains("file4.rs"));

        dashboard.draw(&snapshot_with(12)).unwrap();
        assert_eq!(dashboard.scroll(), 3);

        dashboard.draw(&snapshot_with(2)).unwrap();
        assert_eq!(dashboard.scroll(), 0);
    }

    #[test]
    fn scrolling_is_clamped_to_content() {
        let mut dashboard = dashboard(60, 20);
        dashboard.draw(&snapshot_with(15)).unwrap();

        dashboard.scroll_by(-3);
        assert_eq!(dashboard.scroll(), 0);
        dashboard.scroll_by(100);
        assert_eq!(dashboard.scroll(), 6);
        dashboard.scroll_to_top();
        assert_eq!(dashboard.scroll(), 0);
        dashboard.scroll_to_bottom();
        assert_eq!(dashboard.scroll(), 6);
    }
}
