//! ByteTrack-style association of person boxes across frames.
//!
//! Confident boxes are associated first; weak boxes may only extend people
//! left over from that stage and never introduce someone new. A pair must
//! overlap and keep a compatible silhouette: an upright person's box holds
//! roughly the same height-to-width ratio from one frame to the next, so a
//! box that abruptly changes shape is treated as somebody else.

use crate::gallery::domain::identity::TrackId;
use crate::shared::bounding_box::BoundingBox;

#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f64,
}

/// A person visible in the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub bbox: BoundingBox,
    /// Index of the detection this person was associated with.
    pub detection: usize,
}

const CONFIDENT_SCORE: f64 = 0.5;
const MIN_OVERLAP: f64 = 0.3;
/// Largest factor by which a box's height/width ratio may change between
/// consecutive sightings of the same person.
const MAX_SHAPE_CHANGE: f64 = 1.6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    /// Associated with this detection in the latest frame.
    Seen(usize),
    /// Consecutive frames without a sighting.
    Missing(usize),
}

#[derive(Clone, Debug)]
struct Person {
    id: TrackId,
    bbox: BoundingBox,
    status: Status,
}

pub struct ByteTracker {
    people: Vec<Person>,
    next_id: TrackId,
    max_lost: usize,
}

impl ByteTracker {
    /// `max_lost` is how many consecutive frames a person may go unseen and
    /// still be re-acquired under the same id.
    pub fn new(max_lost: usize) -> Self {
        Self {
            people: Vec::new(),
            next_id: 1,
            max_lost,
        }
    }

    /// Forgets everyone, including people currently missing, and restarts
    /// id assignment.
    pub fn reset(&mut self) {
        self.people.clear();
        self.next_id = 1;
    }

    pub fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        let mut claimed = vec![false; detections.len()];
        let known: Vec<usize> = (0..self.people.len()).collect();

        let leftover = self.associate(&known, detections, &mut claimed, |d| {
            d.score >= CONFIDENT_SCORE
        });
        let unseen = self.associate(&leftover, detections, &mut claimed, |d| {
            d.score < CONFIDENT_SCORE
        });

        for idx in unseen {
            let person = &mut self.people[idx];
            person.status = match person.status {
                Status::Seen(_) => Status::Missing(1),
                Status::Missing(frames) => Status::Missing(frames + 1),
            };
        }
        let max_lost = self.max_lost;
        self.people
            .retain(|p| !matches!(p.status, Status::Missing(frames) if frames > max_lost));

        for (idx, det) in detections.iter().enumerate() {
            if !claimed[idx] && det.score >= CONFIDENT_SCORE {
                self.people.push(Person {
                    id: self.next_id,
                    bbox: det.bbox,
                    status: Status::Seen(idx),
                });
                self.next_id += 1;
            }
        }

        self.people
            .iter()
            .filter_map(|p| match p.status {
                Status::Seen(detection) => Some(Track {
                    id: p.id,
                    bbox: p.bbox,
                    detection,
                }),
                Status::Missing(_) => None,
            })
            .collect()
    }

    /// Pairs `candidates` (indices into `people`) with unclaimed eligible
    /// detections, highest overlap first. Returns the candidates left
    /// without a detection.
    fn associate(
        &mut self,
        candidates: &[usize],
        detections: &[Detection],
        claimed: &mut [bool],
        eligible: impl Fn(&Detection) -> bool,
    ) -> Vec<usize> {
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for &person in candidates {
            let bbox = self.people[person].bbox;
            for (idx, det) in detections.iter().enumerate() {
                if claimed[idx] || !eligible(det) {
                    continue;
                }
                let overlap = bbox.iou(&det.bbox);
                if overlap >= MIN_OVERLAP && same_silhouette(&bbox, &det.bbox) {
                    pairs.push((overlap, person, idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut unmatched = candidates.to_vec();
        for (_, person, idx) in pairs {
            if claimed[idx] || !unmatched.contains(&person) {
                continue;
            }
            claimed[idx] = true;
            unmatched.retain(|&p| p != person);
            let entry = &mut self.people[person];
            entry.bbox = detections[idx].bbox;
            entry.status = Status::Seen(idx);
        }
        unmatched
    }
}

fn same_silhouette(a: &BoundingBox, b: &BoundingBox) -> bool {
    let ratio_a = a.height() / a.width();
    let ratio_b = b.height() / b.width();
    ratio_a.max(ratio_b) <= ratio_a.min(ratio_b) * MAX_SHAPE_CHANGE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> Detection {
        Detection {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            score,
        }
    }

    fn walker(dx: f64, score: f64) -> Detection {
        det(10.0 + dx, 10.0, 60.0 + dx, 130.0, score)
    }

    #[test]
    fn test_new_people_get_unique_ids() {
        let mut tracker = ByteTracker::new(5);
        let tracks = tracker.update(&[
            det(0.0, 0.0, 50.0, 120.0, 0.9),
            det(100.0, 100.0, 150.0, 220.0, 0.8),
        ]);
        assert_eq!(tracks.len(), 2);
        assert_ne!(tracks[0].id, tracks[1].id);
    }

    #[test]
    fn test_walking_person_keeps_id() {
        let mut tracker = ByteTracker::new(5);
        let id = tracker.update(&[walker(0.0, 0.9)])[0].id;

        for step in 1..5 {
            let tracks = tracker.update(&[walker(step as f64 * 3.0, 0.9)]);
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].id, id);
            assert_eq!(tracks[0].detection, 0);
        }
    }

    #[test]
    fn test_person_forgotten_after_max_lost() {
        let mut tracker = ByteTracker::new(2);
        tracker.update(&[walker(0.0, 0.9)]);

        for _ in 0..3 {
            assert!(tracker.update(&[]).is_empty());
        }
        let tracks = tracker.update(&[walker(0.0, 0.9)]);
        assert_eq!(tracks[0].id, 2);
    }

    #[test]
    fn test_person_reacquired_within_max_lost() {
        let mut tracker = ByteTracker::new(3);
        let id = tracker.update(&[walker(0.0, 0.9)])[0].id;

        tracker.update(&[]);
        tracker.update(&[]);
        tracker.update(&[]);

        let tracks = tracker.update(&[walker(2.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, id);
    }

    #[test]
    fn test_missing_people_are_not_reported() {
        let mut tracker = ByteTracker::new(5);
        tracker.update(&[walker(0.0, 0.9), det(300.0, 0.0, 350.0, 120.0, 0.9)]);

        let tracks = tracker.update(&[walker(2.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
    }

    #[test]
    fn test_weak_detection_extends_known_person() {
        let mut tracker = ByteTracker::new(5);
        let id = tracker.update(&[walker(0.0, 0.9)])[0].id;

        let tracks = tracker.update(&[walker(2.0, 0.3)]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, id);
    }

    #[test]
    fn test_weak_detection_never_starts_a_person() {
        let mut tracker = ByteTracker::new(5);
        assert!(tracker.update(&[walker(0.0, 0.3)]).is_empty());
    }

    #[test]
    fn test_box_changing_shape_is_someone_else() {
        let mut tracker = ByteTracker::new(5);
        let id = tracker.update(&[det(0.0, 0.0, 60.0, 120.0, 0.9)])[0].id;

        // Same footprint, half the height: overlaps enough but the ratio
        // halves, so it is not the same upright person.
        let tracks = tracker.update(&[det(0.0, 60.0, 60.0, 120.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
        assert_ne!(tracks[0].id, id);
    }

    #[test]
    fn test_moderate_shape_change_keeps_id() {
        let mut tracker = ByteTracker::new(5);
        let id = tracker.update(&[det(0.0, 0.0, 60.0, 120.0, 0.9)])[0].id;

        let tracks = tracker.update(&[det(0.0, 30.0, 60.0, 120.0, 0.9)]);
        assert_eq!(tracks[0].id, id);
    }

    #[test]
    fn test_reset_forgets_missing_people_and_restarts_ids() {
        let mut tracker = ByteTracker::new(5);
        tracker.update(&[walker(0.0, 0.9)]);
        tracker.update(&[det(300.0, 0.0, 350.0, 120.0, 0.9)]);

        tracker.reset();

        let tracks = tracker.update(&[walker(0.0, 0.3), det(300.0, 0.0, 350.0, 120.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, 1);
        assert_eq!(tracks[0].detection, 1);
    }

    #[test]
    fn test_two_people_matched_independently() {
        let mut tracker = ByteTracker::new(5);
        let first = tracker.update(&[
            det(0.0, 0.0, 50.0, 120.0, 0.9),
            det(200.0, 200.0, 250.0, 320.0, 0.9),
        ]);
        let (left, right) = (first[0].id, first[1].id);

        let second = tracker.update(&[
            det(202.0, 202.0, 252.0, 322.0, 0.9),
            det(2.0, 2.0, 52.0, 122.0, 0.9),
        ]);
        assert_eq!(second.len(), 2);
        let by_detection: Vec<(usize, TrackId)> =
            second.iter().map(|t| (t.detection, t.id)).collect();
        assert!(by_detection.contains(&(1, left)));
        assert!(by_detection.contains(&(0, right)));
    }
}
