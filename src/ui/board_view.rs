use chrono::{DateTime, Utc};
use egui::{Color32, CursorIcon, Pos2, Rect, Rounding, Sense, Stroke, Ui, Vec2};

use crate::ui::theme;
use resource_gantt::board::{BlockHit, DragMode, OperationBlock, PointerGesture, HANDLE_WIDTH};
use resource_gantt::error::BoardError;
use resource_gantt::model::{Operation, OperationFlag, OperationId, ResourceId, TimeAxis};
use resource_gantt::{ScheduleBoard, Submission};

const ROW_HEIGHT: f32 = theme::ROW_HEIGHT;
const ROW_PADDING: f32 = theme::ROW_GAP;
const HEADER_HEIGHT: f32 = theme::HEADER_HEIGHT;
const LABEL_WIDTH: f32 = theme::LANE_LABEL_WIDTH;
const TRAY_CHIP_MIN: f32 = 48.0;
const TRAY_CHIP_MAX: f32 = 160.0;
const ZOOM_STEP: f32 = 1.15;

/// What the host has to act on after a frame of board interaction.
#[derive(Debug, Default)]
pub struct BoardInteraction {
    /// A drop was accepted and applied; run it against the port.
    pub submission: Option<Submission>,
    /// The board refused a gesture (usually busy committing).
    pub refused: Option<BoardError>,
}

/// Screen placement of the lanes and the tray for one frame.
struct Geometry {
    origin: Pos2,
    lanes: Vec<ResourceId>,
}

impl Geometry {
    fn chart_left(&self) -> f32 {
        self.origin.x + LABEL_WIDTH
    }

    fn row_top(&self, index: usize) -> f32 {
        self.origin.y + HEADER_HEIGHT + index as f32 * (ROW_HEIGHT + ROW_PADDING)
    }

    fn tray_top(&self) -> f32 {
        self.row_top(self.lanes.len()) + 8.0
    }

    fn height(&self) -> f32 {
        self.tray_top() + theme::TRAY_HEIGHT - self.origin.y + 24.0
    }

    fn lane_at(&self, y: f32) -> Option<&ResourceId> {
        let offset = y - self.row_top(0);
        if offset < 0.0 {
            return None;
        }
        self.lanes.get((offset / (ROW_HEIGHT + ROW_PADDING)).floor() as usize)
    }

    fn lane_index(&self, resource: &ResourceId) -> Option<usize> {
        self.lanes.iter().position(|r| r == resource)
    }

    fn in_tray(&self, y: f32) -> bool {
        y >= self.tray_top() && y <= self.tray_top() + theme::TRAY_HEIGHT
    }

    /// Axis offset of a screen x coordinate.
    fn axis_x(&self, screen_x: f32) -> f32 {
        screen_x - self.chart_left()
    }

    fn screen_x(&self, axis_x: f32) -> f32 {
        self.chart_left() + axis_x
    }

    fn bar_rect(&self, lane: usize, x: f32, width: f32) -> Rect {
        let inset = theme::BAR_INSET;
        Rect::from_min_size(
            Pos2::new(self.screen_x(x), self.row_top(lane) + ROW_PADDING + inset),
            Vec2::new(width, ROW_HEIGHT - inset * 2.0),
        )
    }
}

/// Unscheduled operations laid out left to right in the tray, in axis pixels.
fn tray_chips<'a>(board: &'a ScheduleBoard, axis: &TimeAxis) -> Vec<(&'a Operation, f32, f32)> {
    let mut x = 4.0;
    board
        .state()
        .unscheduled()
        .into_iter()
        .map(|op| {
            let width = axis.width_of(op.duration()).clamp(TRAY_CHIP_MIN, TRAY_CHIP_MAX);
            let chip = (op, x, width);
            x += width + 6.0;
            chip
        })
        .collect()
}

/// Render the schedule board and translate pointer input into board gestures.
pub fn show_board(board: &mut ScheduleBoard, now: DateTime<Utc>, ui: &mut Ui) -> BoardInteraction {
    let mut interaction = BoardInteraction::default();
    let available = ui.available_size();

    // Ctrl+scroll zooms; the time range stays put.
    if ui.rect_contains_pointer(ui.max_rect()) && ui.input(|i| i.modifiers.ctrl) {
        let scroll = ui.input(|i| i.smooth_scroll_delta.y);
        if scroll > 0.0 {
            board.set_zoom(board.zoom() * ZOOM_STEP);
        } else if scroll < 0.0 {
            board.set_zoom(board.zoom() / ZOOM_STEP);
        }
    }

    if board.drag().is_some() && ui.input(|i| i.key_pressed(egui::Key::Escape)) {
        // Cancel never fails.
        let axis = board.axis((available.x - LABEL_WIDTH).max(1.0), now);
        let _ = board.pointer(PointerGesture::Cancel, &axis);
    }

    let axis = board.axis((available.x - LABEL_WIDTH).max(1.0), now);
    let lanes: Vec<ResourceId> = board.state().resources().map(|r| r.id.clone()).collect();
    let chart_width = LABEL_WIDTH + axis.total_width().max(available.x - LABEL_WIDTH);

    egui::ScrollArea::both()
        .auto_shrink([false, false])
        .show(ui, |ui| {
            let sizing = Geometry {
                origin: Pos2::ZERO,
                lanes: lanes.clone(),
            };
            let (response, painter) = ui.allocate_painter(
                Vec2::new(chart_width, sizing.height().max(available.y)),
                Sense::click_and_drag(),
            );
            let geometry = Geometry {
                origin: response.rect.min,
                lanes,
            };

            handle_pointer(board, &axis, &geometry, &response, ui, &mut interaction);

            painter.rect_filled(response.rect, 0.0, theme::BG_DARK);
            draw_lanes(&painter, board, &geometry, chart_width);
            draw_timeline_header(&painter, &axis, &geometry, chart_width);
            draw_now_line(&painter, &axis, &geometry, now);

            let hover = response.hover_pos();
            let mut tooltip: Option<OperationId> = None;
            let dragged = board.drag().map(|d| d.operation_id.clone());
            for (index, resource) in geometry.lanes.iter().enumerate() {
                for block in board.blocks(resource, &axis) {
                    let rect = geometry.bar_rect(index, block.x, block.width);
                    let ghosted = dragged.as_ref() == Some(&block.operation.id);
                    draw_block(&painter, &block, rect, ghosted);
                    if dragged.is_none() && hover.is_some_and(|p| rect.contains(p)) {
                        tooltip = Some(block.operation.id.clone());
                    }
                }
            }
            draw_tray(&painter, board, &axis, &geometry, chart_width);
            draw_drop_preview(&painter, board, &axis, &geometry);

            if let Some(id) = tooltip {
                if let Some(op) = board.state().operation(&id) {
                    let flags = board.state().flags(&id);
                    let critical = board.critical().contains(&id);
                    egui::show_tooltip_at_pointer(
                        ui.ctx(),
                        ui.layer_id(),
                        egui::Id::new(("operation-tip", id.as_str())),
                        |ui| operation_tooltip(ui, op, &flags, critical),
                    );
                }
            }
        });

    interaction
}

fn handle_pointer(
    board: &mut ScheduleBoard,
    axis: &TimeAxis,
    geometry: &Geometry,
    response: &egui::Response,
    ui: &Ui,
    interaction: &mut BoardInteraction,
) {
    // Cursor affordances while idle.
    if board.drag().is_none() {
        if let Some(pos) = response.hover_pos() {
            if let Some(resource) = geometry.lane_at(pos.y) {
                let x = geometry.axis_x(pos.x);
                let hit = board.blocks(resource, axis).iter().find_map(|b| b.hit(x));
                match hit {
                    Some(BlockHit::ResizeHandle) => ui.ctx().set_cursor_icon(CursorIcon::ResizeHorizontal),
                    Some(BlockHit::Body) => ui.ctx().set_cursor_icon(CursorIcon::Grab),
                    None => {}
                }
            }
        }
    }

    if response.drag_started() {
        let press = ui.input(|i| i.pointer.press_origin());
        if let Some(gesture) = press.and_then(|p| gesture_at(board, axis, geometry, p)) {
            if let Err(err) = board.pointer(gesture, axis) {
                interaction.refused = Some(err);
            }
        }
    }

    if board.drag().is_none() {
        return;
    }
    let Some(pos) = response.interact_pointer_pos().or_else(|| ui.input(|i| i.pointer.latest_pos())) else {
        return;
    };
    let pointer_x = geometry.axis_x(pos.x);
    let lane = geometry.lane_at(pos.y).cloned();

    let gesture = if response.drag_stopped() {
        PointerGesture::End { pointer_x, lane }
    } else if response.dragged() {
        ui.ctx().set_cursor_icon(match board.drag().map(|d| d.mode) {
            Some(DragMode::ResizeEnd) => CursorIcon::ResizeHorizontal,
            _ => CursorIcon::Grabbing,
        });
        PointerGesture::Move { pointer_x, lane }
    } else {
        return;
    };
    match board.pointer(gesture, axis) {
        Ok(submission) => interaction.submission = submission,
        Err(err) => interaction.refused = Some(err),
    }
}

/// The drag a press at `pos` would start: a block on a lane or a tray chip.
fn gesture_at(board: &ScheduleBoard, axis: &TimeAxis, geometry: &Geometry, pos: Pos2) -> Option<PointerGesture> {
    let pointer_x = geometry.axis_x(pos.x);
    if let Some(resource) = geometry.lane_at(pos.y) {
        return board
            .blocks(resource, axis)
            .iter()
            .rev()
            .find_map(|b| b.drag_start(pointer_x));
    }
    if geometry.in_tray(pos.y) {
        return tray_chips(board, axis)
            .into_iter()
            .find(|(_, x, width)| pointer_x >= *x && pointer_x <= x + width)
            .map(|(op, _, _)| PointerGesture::Start {
                operation: op.id.clone(),
                pointer_x,
                mode: DragMode::Move,
            });
    }
    None
}

fn draw_timeline_header(painter: &egui::Painter, axis: &TimeAxis, geometry: &Geometry, width: f32) {
    let origin = geometry.origin;
    painter.rect_filled(
        Rect::from_min_size(origin, Vec2::new(width, HEADER_HEIGHT)),
        0.0,
        theme::BG_HEADER,
    );
    painter.line_segment(
        [
            Pos2::new(origin.x, origin.y + HEADER_HEIGHT),
            Pos2::new(origin.x + width, origin.y + HEADER_HEIGHT),
        ],
        Stroke::new(1.0, theme::BORDER_SUBTLE),
    );

    painter.text(
        Pos2::new(origin.x + 8.0, origin.y + 12.0),
        egui::Align2::LEFT_CENTER,
        axis.range_start.format("%a %d %b %Y").to_string(),
        theme::font_header(),
        theme::TEXT_PRIMARY,
    );

    let bottom = geometry.tray_top() + theme::TRAY_HEIGHT;
    for marker in &axis.markers {
        let x = geometry.screen_x(marker.pixel);
        painter.line_segment(
            [Pos2::new(x, origin.y + HEADER_HEIGHT), Pos2::new(x, bottom)],
            Stroke::new(0.5, theme::GRID_LINE),
        );
        painter.text(
            Pos2::new(x + 3.0, origin.y + 30.0),
            egui::Align2::LEFT_CENTER,
            &marker.label,
            theme::font_sub(),
            theme::TEXT_SECONDARY,
        );
    }
}

fn draw_now_line(painter: &egui::Painter, axis: &TimeAxis, geometry: &Geometry, now: DateTime<Utc>) {
    if now < axis.range_start || now > axis.range_end {
        return;
    }
    let x = geometry.screen_x(axis.to_x(now));
    let top = geometry.origin.y + HEADER_HEIGHT;
    painter.line_segment(
        [Pos2::new(x, top), Pos2::new(x, geometry.tray_top())],
        Stroke::new(1.5, theme::NOW_LINE),
    );

    let badge_w = 34.0;
    let badge_rect = Rect::from_min_size(Pos2::new(x - badge_w / 2.0, top - 1.0), Vec2::new(badge_w, 14.0));
    painter.rect_filled(badge_rect, Rounding::same(3.0), theme::NOW_LINE);
    painter.text(
        badge_rect.center(),
        egui::Align2::CENTER_CENTER,
        "Now",
        theme::font_small(),
        Color32::WHITE,
    );
}

fn draw_lanes(painter: &egui::Painter, board: &ScheduleBoard, geometry: &Geometry, width: f32) {
    let origin = geometry.origin;
    for (i, resource_id) in geometry.lanes.iter().enumerate() {
        let y = geometry.row_top(i);
        let row = Rect::from_min_size(Pos2::new(origin.x, y), Vec2::new(width, ROW_HEIGHT + ROW_PADDING));
        let row_bg = if i % 2 == 0 { theme::BG_PANEL } else { theme::BG_DARK };
        painter.rect_filled(row, 0.0, row_bg);
        painter.line_segment(
            [row.left_bottom(), row.right_bottom()],
            Stroke::new(0.5, theme::BORDER_SUBTLE),
        );

        let Some(resource) = board.state().resource(resource_id) else { continue };
        if !resource.is_active {
            painter.rect_filled(row, 0.0, theme::BG_INACTIVE);
        }

        let label = Rect::from_min_size(row.min, Vec2::new(LABEL_WIDTH, row.height()));
        painter.rect_filled(label, 0.0, theme::BG_LANE_LABEL);
        let mut name = resource.name.clone();
        if !resource.is_active {
            name.push_str(" (inactive)");
        }
        let color = if resource.is_active { theme::TEXT_PRIMARY } else { theme::TEXT_DIM };
        let clipped = painter.with_clip_rect(label.shrink(2.0));
        clipped.text(
            Pos2::new(label.left() + 8.0, label.center().y),
            egui::Align2::LEFT_CENTER,
            name,
            theme::font_bar(),
            color,
        );
        if resource.is_bottleneck {
            clipped.text(
                Pos2::new(label.right() - 6.0, label.center().y),
                egui::Align2::RIGHT_CENTER,
                egui_phosphor::regular::FUNNEL,
                theme::font_bar(),
                theme::BOTTLENECK,
            );
        }
        painter.line_segment(
            [label.right_top(), label.right_bottom()],
            Stroke::new(1.0, theme::BORDER_SUBTLE),
        );
    }
}

fn draw_block(painter: &egui::Painter, block: &OperationBlock<'_>, bar_rect: Rect, ghosted: bool) {
    let op = block.operation;
    let rounding = Rounding::same(theme::BAR_ROUNDING);
    let fill = theme::status_color(op.status);
    let fill = if ghosted { fill.gamma_multiply(0.35) } else { fill };

    if !ghosted {
        painter.rect_filled(bar_rect.translate(Vec2::new(1.0, 2.0)), rounding, Color32::from_black_alpha(35));
    }
    painter.rect_filled(bar_rect, rounding, fill);
    let highlight_rect = Rect::from_min_size(
        bar_rect.min,
        Vec2::new(bar_rect.width(), (bar_rect.height() * 0.45).max(4.0)),
    );
    painter.rect_filled(
        highlight_rect,
        Rounding {
            nw: theme::BAR_ROUNDING,
            ne: theme::BAR_ROUNDING,
            sw: 0.0,
            se: 0.0,
        },
        Color32::from_white_alpha(25),
    );

    if op.completion_percentage > 0 {
        let progress = f32::from(op.completion_percentage.min(100)) / 100.0;
        let progress_rect = Rect::from_min_size(bar_rect.min, Vec2::new(bar_rect.width() * progress, bar_rect.height()));
        painter.rect_filled(progress_rect, rounding, theme::PROGRESS_OVERLAY);
    }

    if let Some(stripe) = theme::priority_stripe(op.priority) {
        let stripe_rect = Rect::from_min_size(bar_rect.min, Vec2::new(bar_rect.width(), 3.0));
        painter.rect_filled(stripe_rect, Rounding::same(1.5), stripe);
    }

    if block.critical {
        painter.rect_stroke(bar_rect.expand(1.0), rounding, Stroke::new(2.0, theme::CRITICAL_MARK));
    }
    if block.dirty {
        painter.rect_stroke(bar_rect.expand(2.5), rounding, Stroke::new(1.5, theme::DIRTY_OUTLINE));
    }
    if !block.flags.is_empty() {
        painter.text(
            Pos2::new(bar_rect.right() - 4.0, bar_rect.center().y),
            egui::Align2::RIGHT_CENTER,
            egui_phosphor::regular::WARNING,
            theme::font_small(),
            theme::DROP_REJECTED,
        );
    }

    if bar_rect.width() > 2.0 * HANDLE_WIDTH {
        let handle_h = bar_rect.height() * 0.55;
        let handle = Rect::from_min_size(
            Pos2::new(bar_rect.right() - 3.5, bar_rect.center().y - handle_h / 2.0),
            Vec2::new(2.0, handle_h),
        );
        painter.rect_filled(handle, Rounding::same(1.0), theme::HANDLE_COLOR.gamma_multiply(0.5));
    }

    if bar_rect.width() > 30.0 {
        let galley = painter.layout_no_wrap(op.name.clone(), theme::font_bar(), theme::TEXT_ON_BAR);
        let clipped = painter.with_clip_rect(bar_rect.shrink2(Vec2::new(HANDLE_WIDTH, 0.0)));
        let text_y = bar_rect.top() + (bar_rect.height() - galley.size().y) / 2.0;
        clipped.galley(Pos2::new(bar_rect.left() + 6.0, text_y), galley, Color32::TRANSPARENT);
    }
}

fn draw_tray(painter: &egui::Painter, board: &ScheduleBoard, axis: &TimeAxis, geometry: &Geometry, width: f32) {
    let top = geometry.tray_top();
    let tray = Rect::from_min_size(Pos2::new(geometry.origin.x, top), Vec2::new(width, theme::TRAY_HEIGHT));
    painter.rect_filled(tray, 0.0, theme::BG_HEADER);
    painter.text(
        Pos2::new(tray.left() + 8.0, tray.center().y),
        egui::Align2::LEFT_CENTER,
        format!("{} Unscheduled", egui_phosphor::regular::TRAY),
        theme::font_sub(),
        theme::TEXT_SECONDARY,
    );

    let dragged = board.drag().map(|d| &d.operation_id);
    for (op, x, chip_width) in tray_chips(board, axis) {
        let rect = Rect::from_min_size(
            Pos2::new(geometry.screen_x(x), top + 5.0),
            Vec2::new(chip_width, theme::TRAY_HEIGHT - 10.0),
        );
        let fill = theme::status_color(op.status);
        let fill = if dragged == Some(&op.id) { fill.gamma_multiply(0.35) } else { fill };
        painter.rect_filled(rect, Rounding::same(theme::BAR_ROUNDING), fill);
        let clipped = painter.with_clip_rect(rect);
        clipped.text(
            Pos2::new(rect.left() + 6.0, rect.center().y),
            egui::Align2::LEFT_CENTER,
            &op.name,
            theme::font_small(),
            theme::TEXT_ON_BAR,
        );
    }
}

/// Ghost block and insertion marker for the operation being dragged.
fn draw_drop_preview(painter: &egui::Painter, board: &ScheduleBoard, axis: &TimeAxis, geometry: &Geometry) {
    let Some(preview) = board.drag().and_then(|d| d.preview.as_ref()) else { return };
    let Some(lane) = geometry.lane_index(&preview.resource_id) else { return };

    let color = if preview.verdict.is_ok() { theme::DROP_OK } else { theme::DROP_REJECTED };
    let x = axis.to_x(preview.proposed_start);
    let width = axis.width_of(preview.proposed_end() - preview.proposed_start).max(4.0);
    let rect = geometry.bar_rect(lane, x, width);

    painter.rect_filled(rect, Rounding::same(theme::BAR_ROUNDING), color.gamma_multiply(0.3));
    painter.rect_stroke(rect, Rounding::same(theme::BAR_ROUNDING), Stroke::new(1.5, color));
    let row_top = geometry.row_top(lane);
    painter.line_segment(
        [
            Pos2::new(rect.left(), row_top),
            Pos2::new(rect.left(), row_top + ROW_HEIGHT + ROW_PADDING),
        ],
        Stroke::new(2.0, color),
    );

    let label = match &preview.verdict {
        Ok(()) => preview.proposed_start.format("%H:%M").to_string(),
        Err(reason) => format!("{} {reason}", egui_phosphor::regular::PROHIBIT),
    };
    painter.text(
        Pos2::new(rect.left() + 2.0, row_top - 2.0),
        egui::Align2::LEFT_BOTTOM,
        label,
        theme::font_small(),
        color,
    );
}

fn operation_tooltip(ui: &mut Ui, op: &Operation, flags: &[OperationFlag], critical: bool) {
    ui.strong(&op.name);
    if let (Some(start), Some(end)) = (op.start, op.end()) {
        ui.label(format!("{} → {}", start.format("%d/%m %H:%M"), end.format("%H:%M")));
    }
    ui.label(format!("{} min · {}", op.duration_minutes, op.status.label()));
    ui.label(format!("Priority {} · {}% done", op.priority.0, op.completion_percentage));
    if let Some(due) = op.due {
        ui.label(format!("Due {}", due.format("%d/%m %H:%M")));
    }
    if op.pinned {
        ui.label(format!("{} Pinned", egui_phosphor::regular::PUSH_PIN));
    }
    if critical {
        ui.colored_label(theme::CRITICAL_MARK, "On the critical path");
    }
    for flag in flags {
        let text = match flag {
            OperationFlag::InactiveResource => "Resource is inactive",
            OperationFlag::UnknownResource => "Resource is unknown",
        };
        ui.colored_label(theme::DROP_REJECTED, format!("{} {text}", egui_phosphor::regular::WARNING));
    }
}
