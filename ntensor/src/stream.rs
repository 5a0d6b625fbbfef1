/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A minimal text format for tensors.
//!
//! A tensor is written as one block per plane:
//!
//! ```text
//! #optional header
//! {
//! [[0,1,2],[3,4,5]]
//! }
//! {
//! [(0,1),(2,3)]
//! }
//!
//! #optional footer
//! ```
//!
//! Dimension brackets nest from the outermost dimension to the
//! innermost one, so the innermost bracket holds a run of
//! `dimensions()[0]` elements. Elements of multi-channel planes are
//! written as a parenthesized group. All delimiters are configurable
//! through [`Delimiters`].
//!
//! Reading is the inverse parse. Input is untrusted: malformed text is
//! reported as a [`StreamError`], never a panic.

use std::io;
use std::io::Read;
use std::io::Write;

use crate::buffer::Buffer;
use crate::buffer::BufferError;
use crate::element::Element;
use crate::plane::Plane;
use crate::planes::with_plane;
use crate::planes::Planes;
use crate::shape::Shape;
use crate::tensor::capability::Capabilities;
use crate::tensor::Tensor;

/// Deepest dimension nesting accepted by the reader.
pub const MAX_DEPTH: usize = 64;

/// Failures while reading or writing the text format.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("expected {expected:?} at offset {position}, found {found:?}")]
    Unbalanced {
        expected: char,
        found: Option<char>,
        position: usize,
    },

    #[error("unexpected {found:?} at offset {position}")]
    Unexpected { found: char, position: usize },

    #[error("invalid {element} value {token:?} at offset {position}")]
    InvalidNumber {
        token: String,
        element: &'static str,
        position: usize,
    },

    #[error("ragged nesting at offset {position}: expected {expected} entries, found {found}")]
    Ragged {
        expected: usize,
        found: usize,
        position: usize,
    },

    #[error("empty group at offset {position}")]
    Empty { position: usize },

    #[error("nesting deeper than {} levels at offset {position}", MAX_DEPTH)]
    TooDeep { position: usize },

    #[error(transparent)]
    Allocation(#[from] BufferError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The characters structuring the text format. They must be pairwise
/// distinct and not whitespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delimiters {
    pub plane_open: char,
    pub plane_close: char,
    pub dim_open: char,
    pub dim_close: char,
    pub channel_open: char,
    pub channel_close: char,
    pub separator: char,
    pub comment: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            plane_open: '{',
            plane_close: '}',
            dim_open: '[',
            dim_close: ']',
            channel_open: '(',
            channel_close: ')',
            separator: ',',
            comment: '#',
        }
    }
}

impl Delimiters {
    fn all(&self) -> [char; 8] {
        [
            self.plane_open,
            self.plane_close,
            self.dim_open,
            self.dim_close,
            self.channel_open,
            self.channel_close,
            self.separator,
            self.comment,
        ]
    }

    fn contains(&self, c: char) -> bool {
        self.all().contains(&c)
    }
}

/// A parsed document.
#[derive(Clone, Debug, PartialEq)]
pub struct Document<T: Element> {
    /// Comment lines preceding the first plane, joined with `\n`.
    pub header: Option<String>,
    pub planes: Vec<Plane<T>>,
    /// Comment lines following the first plane, joined with `\n`.
    pub footer: Option<String>,
}

impl<T: Element> Document<T> {
    pub fn into_planes(self) -> Planes {
        self.planes.into_iter().map(Into::into).collect()
    }

    /// Wraps the planes in a tensor.
    ///
    /// # Panics
    ///
    /// Panics if the document holds no plane.
    pub fn into_tensor<C: Capabilities>(self) -> Tensor<C> {
        Tensor::new(self.into_planes())
    }
}

/// Reader and writer for one set of delimiters.
#[derive(Clone, Debug, Default)]
pub struct StreamFormat {
    delimiters: Delimiters,
}

impl StreamFormat {
    /// # Panics
    ///
    /// Panics if the delimiters are not pairwise distinct or include
    /// whitespace.
    pub fn new(delimiters: Delimiters) -> Self {
        let all = delimiters.all();
        for (i, c) in all.iter().enumerate() {
            assert!(
                !c.is_whitespace(),
                "stream delimiters must not be whitespace: {:?}",
                delimiters
            );
            assert!(
                !all[i + 1..].contains(c),
                "stream delimiters must be pairwise distinct, {:?} repeats: {:?}",
                c,
                delimiters
            );
        }
        Self { delimiters }
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Renders `planes` with optional header and footer comments.
    pub fn render(&self, planes: &Planes, header: Option<&str>, footer: Option<&str>) -> String {
        let d = &self.delimiters;
        let mut out = String::new();
        if let Some(header) = header {
            self.comment_lines(&mut out, header);
        }
        for plane in planes {
            out.push(d.plane_open);
            out.push('\n');
            with_plane!(plane, p => self.render_plane(&mut out, p));
            out.push('\n');
            out.push(d.plane_close);
            out.push('\n');
        }
        if let Some(footer) = footer {
            out.push('\n');
            self.comment_lines(&mut out, footer);
        }
        out
    }

    /// Writes [`StreamFormat::render`] output to `out`.
    pub fn write<W: Write>(
        &self,
        out: &mut W,
        planes: &Planes,
        header: Option<&str>,
        footer: Option<&str>,
    ) -> Result<(), StreamError> {
        out.write_all(self.render(planes, header, footer).as_bytes())?;
        Ok(())
    }

    /// Writes the planes of `tensor`.
    pub fn write_tensor<W: Write, C: Capabilities>(
        &self,
        out: &mut W,
        tensor: &Tensor<C>,
        header: Option<&str>,
        footer: Option<&str>,
    ) -> Result<(), StreamError> {
        self.write(out, tensor.planes(), header, footer)
    }

    fn comment_lines(&self, out: &mut String, text: &str) {
        for line in text.lines() {
            out.push(self.delimiters.comment);
            out.push_str(line);
            out.push('\n');
        }
    }

    fn render_plane<T: Element>(&self, out: &mut String, plane: &Plane<T>) {
        let values = plane.to_vec();
        self.render_level(out, &values, plane.dimensions(), plane.channels());
    }

    /// Renders `values` (logical order) for `dims` (innermost first).
    fn render_level<T: Element>(&self, out: &mut String, values: &[T], dims: &[usize], channels: usize) {
        let d = &self.delimiters;
        let Some((&outer, inner)) = dims.split_last() else {
            return;
        };
        out.push(d.dim_open);
        let chunk = values.len() / outer;
        for (i, run) in values.chunks(chunk).enumerate() {
            if i > 0 {
                out.push(d.separator);
            }
            if inner.is_empty() {
                self.render_element(out, run, channels);
            } else {
                self.render_level(out, run, inner, channels);
            }
        }
        out.push(d.dim_close);
    }

    fn render_element<T: Element>(&self, out: &mut String, values: &[T], channels: usize) {
        let d = &self.delimiters;
        if channels == 1 {
            out.push_str(&values[0].to_string());
            return;
        }
        out.push(d.channel_open);
        for (c, value) in values.iter().enumerate() {
            if c > 0 {
                out.push(d.separator);
            }
            out.push_str(&value.to_string());
        }
        out.push(d.channel_close);
    }

    /// Parses a document holding planes of element type `T`.
    pub fn read<T: Element>(&self, text: &str) -> Result<Document<T>, StreamError> {
        Parser {
            delimiters: &self.delimiters,
            text,
            pos: 0,
            depth: 0,
        }
        .document()
    }

    /// Reads all of `reader` and parses it with [`StreamFormat::read`].
    pub fn read_from<T: Element, R: Read>(&self, mut reader: R) -> Result<Document<T>, StreamError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        self.read(&text)
    }
}

/// A parsed nesting level: either a bracketed list or one element
/// (one value per channel).
enum Node<T> {
    List { items: Vec<Node<T>>, position: usize },
    Element { values: Vec<T>, position: usize },
}

impl<T> Node<T> {
    fn position(&self) -> usize {
        match self {
            Node::List { position, .. } | Node::Element { position, .. } => *position,
        }
    }
}

struct Parser<'a> {
    delimiters: &'a Delimiters,
    text: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.bump(c);
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), StreamError> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.bump(c);
                Ok(())
            }
            found => Err(StreamError::Unbalanced {
                expected,
                found,
                position: self.pos,
            }),
        }
    }

    fn document<T: Element>(mut self) -> Result<Document<T>, StreamError> {
        let d = self.delimiters;
        let mut header = Vec::new();
        let mut footer = Vec::new();
        let mut planes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(c) if c == d.comment => {
                    self.bump(c);
                    let line = self.line();
                    if planes.is_empty() {
                        header.push(line);
                    } else {
                        footer.push(line);
                    }
                }
                Some(c) if c == d.plane_open => {
                    self.bump(c);
                    planes.push(self.plane()?);
                }
                Some(found) => {
                    return Err(StreamError::Unexpected {
                        found,
                        position: self.pos,
                    });
                }
            }
        }
        let join = |lines: Vec<&str>| (!lines.is_empty()).then(|| lines.join("\n"));
        Ok(Document {
            header: join(header),
            planes,
            footer: join(footer),
        })
    }

    /// The rest of the current line, without its terminator.
    fn line(&mut self) -> &'a str {
        let text: &'a str = self.text;
        let rest = &text[self.pos..];
        let end = rest.find('\n').unwrap_or(rest.len());
        self.pos += end;
        rest[..end].trim_end_matches('\r')
    }

    fn plane<T: Element>(&mut self) -> Result<Plane<T>, StreamError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.peek() != Some(self.delimiters.dim_open) {
            return Err(StreamError::Unbalanced {
                expected: self.delimiters.dim_open,
                found: self.peek(),
                position: start,
            });
        }
        let root = self.node::<T>()?;
        self.expect(self.delimiters.plane_close)?;

        // Dimensions outermost first, read along the first branch.
        let mut outer_dims = Vec::new();
        let mut node = &root;
        let channels = loop {
            match node {
                Node::List { items, .. } => {
                    outer_dims.push(items.len());
                    node = &items[0];
                }
                Node::Element { values, .. } => break values.len(),
            }
        };

        let mut values = Vec::new();
        collect(&root, &outer_dims, channels, &mut values)?;
        outer_dims.reverse();
        let buffer = Buffer::from_vec(values)?;
        Ok(Plane::new(buffer, Shape::unaligned(outer_dims), channels, 0))
    }

    fn node<T: Element>(&mut self) -> Result<Node<T>, StreamError> {
        let d = self.delimiters;
        self.skip_whitespace();
        let position = self.pos;
        match self.peek() {
            Some(c) if c == d.dim_open => {
                if self.depth == MAX_DEPTH {
                    return Err(StreamError::TooDeep { position });
                }
                self.bump(c);
                self.depth += 1;
                let items = self.sequence(d.dim_close, Self::node)?;
                self.depth -= 1;
                Ok(Node::List { items, position })
            }
            Some(c) if c == d.channel_open => {
                self.bump(c);
                let values = self.sequence(d.channel_close, Self::number)?;
                Ok(Node::Element { values, position })
            }
            _ => Ok(Node::Element {
                values: vec![self.number()?],
                position,
            }),
        }
    }

    /// Items separated by the separator up to `close`; at least one.
    fn sequence<I>(
        &mut self,
        close: char,
        mut item: impl FnMut(&mut Self) -> Result<I, StreamError>,
    ) -> Result<Vec<I>, StreamError> {
        let start = self.pos;
        self.skip_whitespace();
        if self.peek() == Some(close) {
            return Err(StreamError::Empty { position: start });
        }
        let mut items = Vec::new();
        loop {
            items.push(item(self)?);
            self.skip_whitespace();
            match self.peek() {
                Some(c) if c == self.delimiters.separator => self.bump(c),
                Some(c) if c == close => {
                    self.bump(c);
                    return Ok(items);
                }
                found => {
                    return Err(StreamError::Unbalanced {
                        expected: close,
                        found,
                        position: self.pos,
                    });
                }
            }
        }
    }

    fn number<T: Element>(&mut self) -> Result<T, StreamError> {
        self.skip_whitespace();
        let position = self.pos;
        let text: &'a str = self.text;
        let delimiters: &'a Delimiters = self.delimiters;
        let rest = &text[self.pos..];
        let end = rest
            .find(|c: char| c.is_whitespace() || delimiters.contains(c))
            .unwrap_or(rest.len());
        if end == 0 {
            return match self.peek() {
                Some(found) => Err(StreamError::Unexpected { found, position }),
                None => Err(StreamError::Unbalanced {
                    expected: self.delimiters.dim_close,
                    found: None,
                    position,
                }),
            };
        }
        let token = &rest[..end];
        self.pos += end;
        token.parse::<T>().map_err(|_| StreamError::InvalidNumber {
            token: token.to_string(),
            element: T::NAME,
            position,
        })
    }
}

/// Checks that `node` is a regular nesting of `dims` (outermost first)
/// with `channels` values per element, and appends its values in
/// logical order.
fn collect<T: Element>(
    node: &Node<T>,
    dims: &[usize],
    channels: usize,
    out: &mut Vec<T>,
) -> Result<(), StreamError> {
    match (node, dims.split_first()) {
        (Node::List { items, position }, Some((&extent, inner))) => {
            if items.len() != extent {
                return Err(StreamError::Ragged {
                    expected: extent,
                    found: items.len(),
                    position: *position,
                });
            }
            items
                .iter()
                .try_for_each(|item| collect(item, inner, channels, out))
        }
        (Node::Element { values, position }, None) => {
            if values.len() != channels {
                return Err(StreamError::Ragged {
                    expected: channels,
                    found: values.len(),
                    position: *position,
                });
            }
            out.extend_from_slice(values);
            Ok(())
        }
        (node, Some((&extent, _))) => Err(StreamError::Ragged {
            expected: extent,
            found: 0,
            position: node.position(),
        }),
        (node, None) => Err(StreamError::Ragged {
            expected: channels,
            found: 0,
            position: node.position(),
        }),
    }
}
