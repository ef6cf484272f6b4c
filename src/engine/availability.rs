use crate::directory::{Desk, Directory};
use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// One desk's picture of a day window: occupied stretches with occupant
/// display data, plus the gaps between them.
///
/// Rows are clipped to the window, so a reservation leaking past either
/// boundary only claims the part inside. Rows missing a boundary are
/// skipped. The result partitions the window exactly: the union of used
/// and free periods covers it with no overlap and no zero-length piece.
pub fn desk_availability(
    desk: &Desk,
    book: &OfficeBook,
    window: &Span,
    directory: &Directory,
) -> DeskAvailability {
    let mut used: Vec<UsedPeriod> = book
        .overlapping(window)
        .filter(|r| r.desk_id == desk.id && r.is_active())
        .filter_map(|r| {
            let span = r.span()?.clip(window)?;
            Some(UsedPeriod {
                span,
                reservation_id: r.id,
                occupant: directory.occupant(r.user_id),
                whole_day: r.whole_day,
                status: r.status,
                check_in_deadline: r.check_in_deadline,
                checked_in_at: r.checked_in_at,
            })
        })
        .collect();
    used.sort_by_key(|u| u.span.start);

    let spans: Vec<Span> = used.iter().map(|u| u.span).collect();
    let free_periods = subtract_intervals(&[*window], &merge_overlapping(&spans))
        .into_iter()
        .map(|span| FreePeriod { span })
        .collect();

    DeskAvailability {
        desk_id: desk.id,
        desk_label: desk.display_id(),
        floor_name: directory.floor(desk.floor_id).map(|f| f.name.clone()),
        whole_day_free: used.is_empty(),
        used_periods: used,
        free_periods,
    }
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
