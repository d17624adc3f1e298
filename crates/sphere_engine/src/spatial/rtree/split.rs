//! Node split heuristics
//!
//! Splits operate on box lists only, so the same code splits leaves (entry
//! boxes) and internal nodes (child boxes).

use crate::spatial::BoundingBox;

/// Pick seeds by greatest normalized separation along any axis
///
/// For each axis, the separation is the gap between the entry with the
/// highest low side and the entry with the lowest high side, divided by the
/// total width of the set on that axis. Axes where both extremes are the same
/// entry are skipped.
fn linear_pick_seeds(boxes: &[BoundingBox]) -> Option<(usize, usize)> {
    let mut best: Option<(f32, usize, usize)> = None;

    for axis in 0..3 {
        let mut highest_low = 0;
        let mut lowest_high = 0;
        let mut lowest = f32::INFINITY;
        let mut highest = f32::NEG_INFINITY;

        for (i, b) in boxes.iter().enumerate() {
            if b.min[axis] > boxes[highest_low].min[axis] {
                highest_low = i;
            }
            if b.max[axis] < boxes[lowest_high].max[axis] {
                lowest_high = i;
            }
            lowest = lowest.min(b.min[axis]);
            highest = highest.max(b.max[axis]);
        }

        if highest_low == lowest_high {
            continue;
        }

        let width = highest - lowest;
        let gap = boxes[highest_low].min[axis] - boxes[lowest_high].max[axis];
        let separation = if width > 0.0 { gap / width } else { 0.0 };

        if best.map_or(true, |(s, _, _)| separation > s) {
            best = Some((separation, lowest_high, highest_low));
        }
    }

    best.map(|(_, a, b)| (a, b))
}

/// Pick the pair that would waste the most volume if grouped together
fn quadratic_pick_seeds(boxes: &[BoundingBox]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut worst_waste = f32::NEG_INFINITY;

    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            let waste = boxes[i].enlarge(&boxes[j]).volume() - boxes[i].volume() - boxes[j].volume();
            if waste > worst_waste {
                worst_waste = waste;
                best = (i, j);
            }
        }
    }

    best
}

/// Partition `boxes` into two groups of at least `min_fill` each
///
/// Returns the indices for each group. Requires `boxes.len() >= 2 * min_fill`
/// and at least two boxes.
pub(crate) fn partition(boxes: &[BoundingBox], min_fill: usize) -> (Vec<usize>, Vec<usize>) {
    debug_assert!(boxes.len() >= 2 && boxes.len() >= 2 * min_fill);

    let (seed_a, seed_b) = linear_pick_seeds(boxes)
        .filter(|&(a, b)| boxes[a] != boxes[b])
        .unwrap_or_else(|| quadratic_pick_seeds(boxes));

    let mut group_a = vec![seed_a];
    let mut group_b = vec![seed_b];
    let mut box_a = boxes[seed_a];
    let mut box_b = boxes[seed_b];

    let remaining: Vec<usize> = (0..boxes.len())
        .filter(|&i| i != seed_a && i != seed_b)
        .collect();

    for (k, &i) in remaining.iter().enumerate() {
        let left = remaining.len() - k;

        // One group needs everything that is left to reach the minimum
        if group_a.len() + left <= min_fill {
            group_a.extend_from_slice(&remaining[k..]);
            break;
        }
        if group_b.len() + left <= min_fill {
            group_b.extend_from_slice(&remaining[k..]);
            break;
        }

        let grow_a = box_a.enlargement(&boxes[i]);
        let grow_b = box_b.enlargement(&boxes[i]);
        let to_a = if grow_a == grow_b {
            group_a.len() <= group_b.len()
        } else {
            grow_a < grow_b
        };

        if to_a {
            group_a.push(i);
            box_a = box_a.enlarge(&boxes[i]);
        } else {
            group_b.push(i);
            box_b = box_b.enlarge(&boxes[i]);
        }
    }

    (group_a, group_b)
}
