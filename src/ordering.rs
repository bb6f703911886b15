/// Items that carry a 0-based display position within their container.
pub trait Positioned {
    fn position(&self) -> i64;
    fn set_position(&mut self, position: i64);
}

/// Rewrite every element's position to its dense index (0..len).
pub fn renumber<T: Positioned + Clone>(items: &[T]) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let mut next = item.clone();
            next.set_position(i as i64);
            next
        })
        .collect()
}

/// Append an element at the tail; its position becomes the length before insert.
pub fn append<T: Positioned + Clone>(items: &[T], item: T) -> Vec<T> {
    let mut out: Vec<T> = items.to_vec();
    out.push(item);
    renumber(&out)
}

/// Insert an element at `index`, clamped to `0..=len`.
pub fn insert_at<T: Positioned + Clone>(items: &[T], item: T, index: usize) -> Vec<T> {
    let mut out: Vec<T> = items.to_vec();
    let idx = index.min(out.len());
    out.insert(idx, item);
    renumber(&out)
}

/// Drop every element matching the predicate and renumber the remainder.
pub fn remove_where<T: Positioned + Clone>(items: &[T], mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
    let kept: Vec<T> = items.iter().filter(|it| !pred(it)).cloned().collect();
    renumber(&kept)
}

/// Move the element at `from` to `to` (clamped) and renumber. An out-of-range
/// source returns an unchanged, renumbered copy.
pub fn move_item<T: Positioned + Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out: Vec<T> = items.to_vec();
    if from >= out.len() {
        return renumber(&out);
    }
    let item = out.remove(from);
    let idx = to.min(out.len());
    out.insert(idx, item);
    renumber(&out)
}
