use crate::image::Rect;
use crate::matches::Match;
use float_ord::FloatOrd;
use log::*;

/// Groups overlapping matches, usually of the same object found by several templates
/// or at neighboring positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchClustering {
    /// Groups with fewer matches are discarded.
    pub min_group_size: usize,

    /// Relative tolerance of rectangle edges. Two rectangles are near if every edge
    /// differs by at most `threshold / 2` times the sum of the smaller width and height.
    pub threshold: f64,
}

impl Default for MatchClustering {
    fn default() -> Self {
        Self {
            min_group_size: 1,
            threshold: 0.2,
        }
    }
}

/// Matches found to belong together.
#[derive(Debug, Clone)]
pub struct MatchGroup<'t> {
    pub matches: Vec<Match<'t>>,
    /// Mean of the member bounding rectangles, rounded up.
    pub rect: Rect,
    /// Best scoring member.
    pub representative: Match<'t>,
}

impl<'t> MatchGroup<'t> {
    fn new(matches: Vec<Match<'t>>, representative: Match<'t>) -> Self {
        let rect = average_rect(matches.iter().map(Match::bounding_rect));
        Self {
            matches,
            rect,
            representative,
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl MatchClustering {
    pub fn new(min_group_size: usize) -> Self {
        Self {
            min_group_size,
            ..Default::default()
        }
    }

    /// Partitions `matches` into groups of transitively near bounding rectangles.
    ///
    /// Groups are ordered by their first member in `matches`.
    pub fn group<'t>(&self, matches: &[Match<'t>]) -> Vec<MatchGroup<'t>> {
        let threshold = self.threshold / 2.0;
        let rects = matches.iter().map(Match::bounding_rect).collect::<Vec<_>>();

        let mut parents = (0..matches.len()).collect::<Vec<_>>();
        for i in 0..rects.len() {
            for j in i + 1..rects.len() {
                if is_near(&rects[i], &rects[j], threshold) {
                    union(&mut parents, i, j);
                }
            }
        }

        let mut groups: Vec<(usize, Vec<Match<'t>>, Match<'t>)> = Vec::new();
        for (i, m) in matches.iter().enumerate() {
            let root = find(&mut parents, i);
            match groups.iter_mut().find(|(group_root, _, _)| *group_root == root) {
                Some((_, members, best)) => {
                    if FloatOrd(m.score) > FloatOrd(best.score) {
                        *best = *m;
                    }
                    members.push(*m);
                }
                None => groups.push((root, vec![*m], *m)),
            }
        }

        let groups = groups
            .into_iter()
            .filter(|(_, members, _)| members.len() >= self.min_group_size)
            .map(|(_, members, best)| MatchGroup::new(members, best))
            .collect::<Vec<_>>();
        debug!("Grouped {} matches into {} groups", matches.len(), groups.len());
        groups
    }
}

fn find(parents: &mut [usize], mut i: usize) -> usize {
    while parents[i] != i {
        parents[i] = parents[parents[i]];
        i = parents[i];
    }
    i
}

fn union(parents: &mut [usize], a: usize, b: usize) {
    let (a, b) = (find(parents, a), find(parents, b));
    // The lower index stays the root.
    if a < b {
        parents[b] = a;
    } else {
        parents[a] = b;
    }
}

fn is_near(r1: &Rect, r2: &Rect, threshold: f64) -> bool {
    if r1.contains_rect(r2) || r2.contains_rect(r1) {
        return true;
    }
    let min_width = r1.width.min(r2.width);
    let min_height = r1.height.min(r2.height);
    let delta = threshold * f64::from(min_width + min_height);

    f64::from((r1.x - r2.x).abs()) <= delta
        && f64::from((r1.y - r2.y).abs()) <= delta
        && f64::from((r1.right() - r2.right()).abs()) <= delta
        && f64::from((r1.bottom() - r2.bottom()).abs()) <= delta
}

fn average_rect(rects: impl Iterator<Item = Rect>) -> Rect {
    let (mut count, mut x, mut y, mut width, mut height) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for rect in rects {
        count += 1.0;
        x += f64::from(rect.x);
        y += f64::from(rect.y);
        width += f64::from(rect.width);
        height += f64::from(rect.height);
    }
    if count == 0.0 {
        return Rect::default();
    }
    Rect::new(
        (x / count).ceil() as i32,
        (y / count).ceil() as i32,
        (width / count).ceil() as i32,
        (height / count).ceil() as i32,
    )
}
