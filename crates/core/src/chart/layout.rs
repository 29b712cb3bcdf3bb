//! Pure geometry for a gantt chart.
//!
//! Everything here is computed from the task list and the chart configuration
//! alone, so two calls with the same input produce identical layouts. The
//! rasterizer only draws what this module positions.

use chrono::{Datelike, Duration, NaiveDate};

use crate::chart::palette::{Color, ColorAssignment};
use crate::config::ChartConfig;
use crate::dates::{date_bounds, date_range_days, format_date};
use crate::domain::task::Task;

pub const EMPTY_ANNOTATION: &str = "No tasks with valid dates found";
pub const OTHER_GROUP: &str = "Other";
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

/// Bars longer than this many days carry their duration inside the bar.
const INSIDE_LABEL_MIN_DAYS: i64 = 3;
const MAX_TICKS: i64 = 10;
const DAY_STEPS: [i64; 4] = [1, 2, 7, 14];
const MONTH_STEPS: [i64; 11] = [1, 2, 3, 6, 12, 24, 60, 120, 300, 600, 1200];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

/// Text positioned by its anchor point; `y` is the vertical center.
#[derive(Clone, Debug, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size_px: f32,
    pub anchor: Anchor,
    pub color: Color,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlotArea {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl PlotArea {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Inclusive first and last day shown on the time axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisBounds {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AxisBounds {
    pub fn days(&self) -> i64 {
        date_range_days(self.start, self.end)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AxisTick {
    pub date: NaiveDate,
    pub x: f32,
    pub label: TextItem,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupBand {
    pub name: Option<String>,
    pub y_top: f32,
    pub y_bottom: f32,
    pub shaded: bool,
    pub header: Option<TextItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BarRow {
    pub task_id: String,
    pub name: String,
    pub group: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub color: Color,
    pub x_start: f32,
    pub x_end: f32,
    pub y_top: f32,
    pub y_bottom: f32,
    pub name_label: TextItem,
    pub bar_label: Option<TextItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
    pub swatch_x: f32,
    pub swatch_y: f32,
    pub swatch_size: f32,
    pub text: TextItem,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GanttLayout {
    pub width: u32,
    pub height: u32,
    pub plot: PlotArea,
    pub title: TextItem,
    pub axis: Option<AxisBounds>,
    pub ticks: Vec<AxisTick>,
    pub bands: Vec<GroupBand>,
    pub separators: Vec<f32>,
    pub rows: Vec<BarRow>,
    pub today_x: Option<f32>,
    pub today_label: Option<TextItem>,
    pub annotation: Option<TextItem>,
    pub legend: Vec<LegendEntry>,
}

/// Tasks sharing one group value, in their original relative order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskGroup<'a> {
    pub name: Option<String>,
    pub tasks: Vec<&'a Task>,
}

/// Partitions tasks by `group_by`. Groups keep first-appearance order and a
/// missing value falls into [`OTHER_GROUP`]. Without `group_by` there is one
/// unnamed group holding every task.
pub fn group_tasks<'a>(tasks: &'a [Task], group_by: Option<&str>) -> Vec<TaskGroup<'a>> {
    let Some(field) = group_by else {
        return vec![TaskGroup { name: None, tasks: tasks.iter().collect() }];
    };

    let mut groups: Vec<TaskGroup<'a>> = Vec::new();
    for task in tasks {
        let key = task.field_value(field).unwrap_or(OTHER_GROUP);
        match groups.iter_mut().find(|group| group.name.as_deref() == Some(key)) {
            Some(group) => group.tasks.push(task),
            None => groups.push(TaskGroup { name: Some(key.to_owned()), tasks: vec![task] }),
        }
    }
    groups
}

/// Axis covering every task. A single-day span is widened by one day on each
/// side, except at the edges of the calendar.
pub fn axis_bounds(tasks: &[Task]) -> Option<AxisBounds> {
    let (start, _) = date_bounds(tasks.iter().map(|task| task.start))?;
    let (_, end) = date_bounds(tasks.iter().map(|task| task.end))?;
    if start == end {
        return Some(AxisBounds {
            start: start.pred_opt().unwrap_or(start),
            end: end.succ_opt().unwrap_or(end),
        });
    }
    Some(AxisBounds { start, end })
}

struct Metrics {
    dpi: f32,
}

impl Metrics {
    fn pt(&self, points: f32) -> f32 {
        points * self.dpi / 72.0
    }

    /// Rough advance width used to reserve space before any font is loaded.
    fn estimate_width(&self, text: &str, size_px: f32) -> f32 {
        text.chars().count() as f32 * size_px * 0.55
    }
}

const TITLE_COLOR: Color = Color::rgb(0x2c, 0x3e, 0x50);
const MUTED_COLOR: Color = Color::rgb(0x7f, 0x8c, 0x8d);
const TODAY_COLOR: Color = Color::rgb(0xe7, 0x4c, 0x3c);

pub fn compute_layout(
    tasks: &[Task],
    config: &ChartConfig,
    today: Option<NaiveDate>,
) -> GanttLayout {
    let (width, height) = config.pixel_size();
    let metrics = Metrics { dpi: config.dpi as f32 };
    let (w, h) = (width as f32, height as f32);

    let title_px = metrics.pt(14.0);
    let label_px = metrics.pt(9.0);
    let tick_px = metrics.pt(8.0);

    let colors = ColorAssignment::resolve(tasks, &config.category_colors, config.default_color);
    let legend_items = legend_items(tasks, &colors);

    let title_band = title_px * 2.2;
    let legend_band = if legend_items.is_empty() { 0.0 } else { label_px * 2.0 };
    let longest_name = tasks
        .iter()
        .map(|task| metrics.estimate_width(&task.name, label_px))
        .fold(0.0_f32, f32::max);
    let gutter = (longest_name + metrics.pt(12.0)).clamp(w * 0.12, w * 0.35);

    let left = gutter.min(w - 1.0).max(0.0);
    let top = (title_band + legend_band).min(h - 1.0).max(0.0);
    let right = (w - metrics.pt(24.0)).max(left + 1.0);
    let bottom = (h - tick_px * 3.5).max(top + 1.0);
    let plot = PlotArea { left, top, right, bottom };

    let title = TextItem {
        text: config.title.clone(),
        x: w / 2.0,
        y: title_band / 2.0,
        size_px: title_px,
        anchor: Anchor::Middle,
        color: TITLE_COLOR,
    };

    let legend = place_legend(legend_items, &metrics, label_px, title_band, w);

    let Some(axis) = axis_bounds(tasks) else {
        return GanttLayout {
            width,
            height,
            plot,
            title,
            axis: None,
            ticks: Vec::new(),
            bands: Vec::new(),
            separators: Vec::new(),
            rows: Vec::new(),
            today_x: None,
            today_label: None,
            annotation: Some(TextItem {
                text: EMPTY_ANNOTATION.to_owned(),
                x: plot.left + plot.width() / 2.0,
                y: plot.top + plot.height() / 2.0,
                size_px: label_px * 1.2,
                anchor: Anchor::Middle,
                color: MUTED_COLOR,
            }),
            legend,
        };
    };

    let px_per_day = plot.width() / axis.days() as f32;
    let x_of = |date: NaiveDate| plot.left + (date - axis.start).num_days() as f32 * px_per_day;

    let groups = group_tasks(tasks, config.group_by.as_deref());
    let grouped = config.group_by.is_some();
    let header_units = if grouped { 0.7 } else { 0.0 };
    let units = tasks.len() as f32 + header_units * groups.len() as f32;
    let row_h = (plot.height() / units.max(1.0)).min(metrics.pt(28.0));
    let bar_h = row_h * 0.6;

    let mut bands = Vec::with_capacity(groups.len());
    let mut rows = Vec::with_capacity(tasks.len());
    let mut y = plot.top;
    for (index, group) in groups.iter().enumerate() {
        let band_top = y;
        let header = group.name.as_ref().filter(|_| grouped).map(|name| TextItem {
            text: name.clone(),
            x: plot.left + metrics.pt(4.0),
            y: band_top + header_units * row_h / 2.0,
            size_px: label_px,
            anchor: Anchor::Start,
            color: MUTED_COLOR,
        });
        y += header_units * row_h;

        for task in &group.tasks {
            let center = y + row_h / 2.0;
            let x_start = x_of(task.start);
            let x_end = x_of(task.end) + px_per_day;
            let color = colors.color_for(task);
            let bar_label = (task.duration_days() > INSIDE_LABEL_MIN_DAYS).then(|| TextItem {
                text: format!("{}d", task.duration_days()),
                x: (x_start + x_end) / 2.0,
                y: center,
                size_px: tick_px,
                anchor: Anchor::Middle,
                color: contrast_text(color),
            });

            rows.push(BarRow {
                task_id: task.id.clone(),
                name: task.name.clone(),
                group: group.name.clone(),
                start: task.start,
                end: task.end,
                color,
                x_start,
                x_end,
                y_top: center - bar_h / 2.0,
                y_bottom: center + bar_h / 2.0,
                name_label: TextItem {
                    text: task.name.clone(),
                    x: plot.left - metrics.pt(6.0),
                    y: center,
                    size_px: label_px,
                    anchor: Anchor::End,
                    color: TITLE_COLOR,
                },
                bar_label,
            });
            y += row_h;
        }

        bands.push(GroupBand {
            name: group.name.clone(),
            y_top: band_top,
            y_bottom: y,
            shaded: grouped && index % 2 == 1,
            header,
        });
    }

    let separators = bands.iter().skip(1).map(|band| band.y_top).collect();

    let ticks = axis_ticks(axis)
        .into_iter()
        .map(|(date, text)| {
            let x = x_of(date);
            AxisTick {
                date,
                x,
                label: TextItem {
                    text,
                    x,
                    y: plot.bottom + tick_px * 1.2,
                    size_px: tick_px,
                    anchor: Anchor::Middle,
                    color: MUTED_COLOR,
                },
            }
        })
        .collect();

    let today_x = today
        .filter(|_| config.show_today)
        .filter(|day| axis.start <= *day && *day <= axis.end)
        .map(|day| x_of(day) + px_per_day / 2.0);
    let today_label = today_x.map(|x| TextItem {
        text: "Today".to_owned(),
        x,
        y: plot.top - tick_px * 0.8,
        size_px: tick_px,
        anchor: Anchor::Middle,
        color: TODAY_COLOR,
    });

    GanttLayout {
        width,
        height,
        plot,
        title,
        axis: Some(axis),
        ticks,
        bands,
        separators,
        rows,
        today_x,
        today_label,
        annotation: None,
        legend,
    }
}

/// One entry per category present, sorted by name, plus an uncategorized
/// entry when some task has no category.
fn legend_items(tasks: &[Task], colors: &ColorAssignment) -> Vec<(String, Color)> {
    let mut items: Vec<(String, Color)> = Vec::new();
    let mut has_uncategorized = false;
    for task in tasks {
        match &task.category {
            Some(category) => {
                if !items.iter().any(|(label, _)| label == category) {
                    items.push((category.clone(), colors.color_for(task)));
                }
            }
            None => has_uncategorized = true,
        }
    }
    items.sort_by(|left, right| left.0.cmp(&right.0));

    if has_uncategorized && !items.is_empty() {
        if let Some(task) = tasks.iter().find(|task| task.category.is_none()) {
            items.push((UNCATEGORIZED_LABEL.to_owned(), colors.color_for(task)));
        }
    }
    items
}

/// Lays legend entries left to right, right-aligned under the title.
fn place_legend(
    items: Vec<(String, Color)>,
    metrics: &Metrics,
    label_px: f32,
    row_top: f32,
    width: f32,
) -> Vec<LegendEntry> {
    let swatch = label_px * 0.9;
    let gap = metrics.pt(4.0);
    let spacing = metrics.pt(12.0);
    let total: f32 = items
        .iter()
        .map(|(label, _)| swatch + gap + metrics.estimate_width(label, label_px) + spacing)
        .sum();

    let center_y = row_top + label_px;
    let mut x = (width - metrics.pt(24.0) - total).max(metrics.pt(6.0));
    items
        .into_iter()
        .map(|(label, color)| {
            let entry = LegendEntry {
                swatch_x: x,
                swatch_y: center_y - swatch / 2.0,
                swatch_size: swatch,
                text: TextItem {
                    text: label.clone(),
                    x: x + swatch + gap,
                    y: center_y,
                    size_px: label_px,
                    anchor: Anchor::Start,
                    color: TITLE_COLOR,
                },
                label,
                color,
            };
            x = entry.text.x + metrics.estimate_width(&entry.text.text, label_px) + spacing;
            entry
        })
        .collect()
}

/// Tick dates with labels. Short spans step by days, long spans by months,
/// keeping at most about ten ticks.
pub fn axis_ticks(axis: AxisBounds) -> Vec<(NaiveDate, String)> {
    let days = axis.days();
    if let Some(step) = DAY_STEPS.iter().copied().find(|step| days / step <= MAX_TICKS) {
        return (0..days)
            .step_by(step as usize)
            .map(|offset| {
                let date = axis.start + Duration::days(offset);
                (date, format_date(date, "%b %d"))
            })
            .collect();
    }

    let months = i64::from(month_index(axis.end) - month_index(axis.start)) + 1;
    let step = MONTH_STEPS
        .iter()
        .copied()
        .find(|step| months / step <= MAX_TICKS)
        .unwrap_or((months + MAX_TICKS - 1) / MAX_TICKS);

    // Whole-year steps start on a year divisible by the step, labelled by year only.
    let (mut index, label_format) = if step >= 12 {
        let first = i64::from(month_index(axis.start));
        ((first + step - 1).div_euclid(step) * step, "%Y")
    } else {
        let first = i64::from(month_index(axis.start));
        (if axis.start.day() == 1 { first } else { first + 1 }, "%b %Y")
    };

    let mut ticks = Vec::new();
    while let Some(date) = i32::try_from(index).ok().and_then(month_start) {
        if date > axis.end {
            break;
        }
        ticks.push((date, format_date(date, label_format)));
        index += step;
    }
    ticks
}

fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

fn month_start(index: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
}

fn contrast_text(fill: Color) -> Color {
    if fill.luminance() > 150.0 {
        TITLE_COLOR
    } else {
        Color::rgb(0xff, 0xff, 0xff)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{axis_bounds, axis_ticks, compute_layout, group_tasks, AxisBounds, EMPTY_ANNOTATION, OTHER_GROUP};
    use crate::config::ChartConfig;
    use crate::domain::task::Task;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn task(name: &str, start: NaiveDate, end: NaiveDate, group: Option<&str>) -> Task {
        let task = Task::new(name, start, Some(end));
        match group {
            Some(group) => task.with_group(group),
            None => task,
        }
    }

    #[test]
    fn groups_keep_first_appearance_and_relative_order() {
        let tasks = vec![
            task("a", ymd(2024, 1, 1), ymd(2024, 1, 2), Some("Backend")),
            task("b", ymd(2024, 1, 1), ymd(2024, 1, 2), None),
            task("c", ymd(2024, 1, 1), ymd(2024, 1, 2), Some("Frontend")),
            task("d", ymd(2024, 1, 1), ymd(2024, 1, 2), Some("Backend")),
        ];

        let groups = group_tasks(&tasks, Some("group"));
        let names: Vec<_> = groups.iter().map(|group| group.name.as_deref()).collect();
        assert_eq!(names, vec![Some("Backend"), Some(OTHER_GROUP), Some("Frontend")]);
        let backend: Vec<_> = groups[0].tasks.iter().map(|task| task.name.as_str()).collect();
        assert_eq!(backend, vec!["a", "d"]);

        let ungrouped = group_tasks(&tasks, None);
        assert_eq!(ungrouped.len(), 1);
        assert_eq!(ungrouped[0].tasks.len(), 4);
    }

    #[test]
    fn grouped_rows_are_contiguous() {
        let tasks = vec![
            task("a", ymd(2024, 1, 1), ymd(2024, 1, 2), Some("x")),
            task("b", ymd(2024, 1, 3), ymd(2024, 1, 4), Some("y")),
            task("c", ymd(2024, 1, 5), ymd(2024, 1, 6), Some("x")),
        ];
        let config = ChartConfig { group_by: Some("group".into()), ..ChartConfig::default() };

        let layout = compute_layout(&tasks, &config, None);
        let order: Vec<_> = layout.rows.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
        assert_eq!(layout.bands.len(), 2);
        assert_eq!(layout.separators.len(), 1);
        assert!(layout.rows.windows(2).all(|pair| pair[0].y_top < pair[1].y_top));
    }

    #[test]
    fn single_day_axis_is_widened_and_bars_have_width() {
        let tasks = vec![task("only", ymd(2024, 1, 3), ymd(2024, 1, 3), None)];
        assert_eq!(
            axis_bounds(&tasks),
            Some(AxisBounds { start: ymd(2024, 1, 2), end: ymd(2024, 1, 4) })
        );

        let layout = compute_layout(&tasks, &ChartConfig::default(), None);
        let row = &layout.rows[0];
        assert!(row.x_end > row.x_start);
        let day_px = layout.plot.width() / 3.0;
        assert!((row.x_end - row.x_start - day_px).abs() < 0.01);
    }

    #[test]
    fn every_bar_ends_after_it_starts_and_stays_in_the_plot() {
        let tasks = vec![
            task("a", ymd(2024, 1, 1), ymd(2024, 3, 31), None),
            task("b", ymd(2024, 2, 10), ymd(2024, 2, 10), None),
            task("c", ymd(2024, 3, 31), ymd(2024, 3, 31), None),
        ];
        let layout = compute_layout(&tasks, &ChartConfig::default(), None);
        for row in &layout.rows {
            assert!(row.x_end > row.x_start, "{} has no width", row.name);
            assert!(row.x_start >= layout.plot.left - 0.01);
            assert!(row.x_end <= layout.plot.right + 0.01);
        }
    }

    #[test]
    fn empty_input_yields_annotation_only() {
        let layout = compute_layout(&[], &ChartConfig::default(), Some(ymd(2024, 1, 1)));
        assert_eq!(layout.axis, None);
        assert!(layout.rows.is_empty());
        assert_eq!(layout.annotation.map(|item| item.text).as_deref(), Some(EMPTY_ANNOTATION));
        assert_eq!(layout.today_x, None);
    }

    #[test]
    fn today_marker_only_inside_axis_and_when_enabled() {
        let tasks = vec![task("a", ymd(2024, 1, 1), ymd(2024, 1, 10), None)];
        let config = ChartConfig::default();
        assert!(compute_layout(&tasks, &config, Some(ymd(2024, 1, 5))).today_x.is_some());
        assert!(compute_layout(&tasks, &config, Some(ymd(2024, 2, 5))).today_x.is_none());

        let hidden = ChartConfig { show_today: false, ..ChartConfig::default() };
        assert!(compute_layout(&tasks, &hidden, Some(ymd(2024, 1, 5))).today_x.is_none());
    }

    #[test]
    fn layout_is_deterministic() {
        let tasks = vec![
            task("a", ymd(2024, 1, 1), ymd(2024, 1, 5), Some("x")).with_category("dev"),
            task("b", ymd(2024, 1, 3), ymd(2024, 1, 3), Some("y")).with_category("qa"),
        ];
        let config = ChartConfig { group_by: Some("group".into()), ..ChartConfig::default() };
        assert_eq!(compute_layout(&tasks, &config, None), compute_layout(&tasks, &config, None));
    }

    #[test]
    fn ticks_switch_from_days_to_months_on_long_spans() {
        let short = axis_ticks(AxisBounds { start: ymd(2024, 1, 1), end: ymd(2024, 1, 5) });
        assert_eq!(short.len(), 5);
        assert_eq!(short[0].1, "Jan 01");

        let long = axis_ticks(AxisBounds { start: ymd(2024, 1, 15), end: ymd(2024, 6, 20) });
        let labels: Vec<_> = long.iter().map(|(_, label)| label.as_str()).collect();
        assert_eq!(labels, vec!["Feb 2024", "Mar 2024", "Apr 2024", "May 2024", "Jun 2024"]);

        let years = axis_ticks(AxisBounds { start: ymd(2020, 1, 1), end: ymd(2024, 12, 31) });
        assert!(years.len() <= 11);
        assert_eq!(years[0].1, "Jan 2020");
    }

    #[test]
    fn mistyped_years_still_get_a_readable_axis() {
        let ticks = axis_ticks(AxisBounds { start: ymd(204, 3, 1), end: ymd(2024, 5, 1) });
        assert!(!ticks.is_empty());
        assert!(ticks.len() <= 11, "{} ticks", ticks.len());
        assert!(ticks.iter().all(|(_, label)| label.len() <= 4));

        let decades = axis_ticks(AxisBounds { start: ymd(1931, 6, 1), end: ymd(2024, 5, 1) });
        let labels: Vec<_> = decades.iter().map(|(_, label)| label.as_str()).collect();
        assert_eq!(labels, vec!["1940", "1950", "1960", "1970", "1980", "1990", "2000", "2010", "2020"]);
    }

    #[test]
    fn calendar_edge_dates_lay_out_without_overflow() {
        let tasks = vec![
            Task::new("first", NaiveDate::MIN, None),
            Task::new("last", NaiveDate::MAX, None),
        ];
        let layout = compute_layout(&tasks, &ChartConfig::default(), None);
        assert_eq!(layout.rows.len(), 2);

        let single = vec![Task::new("edge", NaiveDate::MAX, None)];
        let axis = axis_bounds(&single).expect("axis");
        assert_eq!(axis.end, NaiveDate::MAX);
    }
}
