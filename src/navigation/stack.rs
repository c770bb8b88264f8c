//! 页面栈：纯 LIFO，只保存页面 ID，不持有页面条目
//!
//! 本身不做并发保护，由 Navigator 的单消费者处理保证串行访问。

use crate::core::error::StackError;
use crate::page::PageId;

#[derive(Debug, Default, Clone)]
pub struct PageStack {
    items: Vec<PageId>,
}

impl PageStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: PageId) {
        self.items.push(id);
    }

    pub fn pop(&mut self) -> Result<PageId, StackError> {
        self.items.pop().ok_or(StackError::Empty)
    }

    pub fn try_pop(&mut self) -> Option<PageId> {
        self.items.pop()
    }

    pub fn peek(&self) -> Result<&PageId, StackError> {
        self.items.last().ok_or(StackError::Empty)
    }

    pub fn try_peek(&self) -> Option<&PageId> {
        self.items.last()
    }

    pub fn is_top(&self, id: &PageId) -> bool {
        self.try_peek() == Some(id)
    }

    pub fn contains(&self, id: &PageId) -> bool {
        self.items.contains(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 自底向上的 ID 列表
    pub fn as_slice(&self) -> &[PageId] {
        &self.items
    }
}

impl FromIterator<PageId> for PageStack {
    /// 按自底向上的顺序重建
    fn from_iter<I: IntoIterator<Item = PageId>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
