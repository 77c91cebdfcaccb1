//! The expression walk shared by evaluation and type checking

use odata_ast::{BinaryOp, Expression, Literal, MemberSegment, Method, UnaryOp};
use odata_diagnostics::{ODataError, Result};
use odata_names::{Path, QualifiedName, path_to_str};

/// One pass over a common expression tree
///
/// The walk drives most nodes bottom-up, handing the visitor finished
/// judgments for the operands.  Three node kinds receive their raw
/// sub-expressions instead: member chains (the visitor owns the
/// traversal context), conditionals (the `else` branch must not be
/// forced when the test settles it) and collection constructors (a
/// two-argument `if` item is skipped entirely when its test fails).
pub trait ExpressionVisitor {
    /// What a sub-expression resolves to: a value for evaluation, a
    /// type for checking
    type Judgment;

    fn literal(&mut self, lit: &Literal) -> Result<Self::Judgment>;

    /// `$it`, the implicit variable
    fn it(&mut self) -> Result<Self::Judgment>;

    /// A lambda or parameter variable reference
    fn variable(&mut self, name: &str) -> Result<Self::Judgment>;

    /// A member chain rooted at the implicit variable
    fn member(&mut self, segments: &[MemberSegment]) -> Result<Self::Judgment>;

    /// An annotation `<Path>` value, resolved against the context
    fn path_value(&mut self, path: &Path) -> Result<Self::Judgment>;

    fn unary(&mut self, op: UnaryOp, operand: Self::Judgment) -> Result<Self::Judgment>;

    fn binary(
        &mut self,
        op: BinaryOp,
        left: Self::Judgment,
        right: Self::Judgment,
    ) -> Result<Self::Judgment>;

    fn call(&mut self, method: Method, args: Vec<Self::Judgment>) -> Result<Self::Judgment>;

    /// `cast(type)` applies to the implicit variable; the operand is
    /// present for the two-argument form
    fn cast(
        &mut self,
        type_name: &QualifiedName,
        operand: Option<Self::Judgment>,
    ) -> Result<Self::Judgment>;

    fn is_of(
        &mut self,
        type_name: &QualifiedName,
        operand: Option<Self::Judgment>,
    ) -> Result<Self::Judgment>;

    /// Conditional; `otherwise` is `None` only inside a collection
    /// constructor, where [`ExpressionVisitor::collection`] handles it
    fn condition(
        &mut self,
        test: &Expression,
        then: &Expression,
        otherwise: Option<&Expression>,
    ) -> Result<Self::Judgment>;

    fn collection(&mut self, items: &[Expression]) -> Result<Self::Judgment>;

    fn record(&mut self, fields: &[(String, Expression)]) -> Result<Self::Judgment>;
}

/// Drive a visitor over one expression tree
pub fn walk<V>(visitor: &mut V, expr: &Expression) -> Result<V::Judgment>
where
    V: ExpressionVisitor + ?Sized,
{
    match expr {
        Expression::Literal(lit) => visitor.literal(lit),
        Expression::Root => Err(ODataError::expression(
            "$root is only valid at the head of a resource path",
        )),
        Expression::It => visitor.it(),
        Expression::Variable(name) => visitor.variable(name),
        Expression::Member(segments) => visitor.member(segments),
        Expression::PathValue(path) => visitor.path_value(path),
        Expression::AnnotationPath(path)
        | Expression::NavigationPath(path)
        | Expression::PropertyPath(path) => {
            // path-valued annotation expressions denote the path
            // itself, not the value it addresses
            visitor.literal(&Literal::String(path_to_str(path)))
        }
        Expression::Reference(qname) => Err(ODataError::expression(format!(
            "labeled element references are not supported: {qname}"
        ))),
        Expression::Unary { op, operand } => {
            let operand = walk(visitor, operand)?;
            visitor.unary(*op, operand)
        }
        Expression::Binary { op, left, right } => {
            let left = walk(visitor, left)?;
            let right = walk(visitor, right)?;
            visitor.binary(*op, left, right)
        }
        Expression::Call { method, args } => {
            let args = args
                .iter()
                .map(|arg| walk(visitor, arg))
                .collect::<Result<Vec<_>>>()?;
            visitor.call(*method, args)
        }
        Expression::Cast { type_name, operand } => {
            let operand = operand
                .as_deref()
                .map(|operand| walk(visitor, operand))
                .transpose()?;
            visitor.cast(type_name, operand)
        }
        Expression::IsOf { type_name, operand } => {
            let operand = operand
                .as_deref()
                .map(|operand| walk(visitor, operand))
                .transpose()?;
            visitor.is_of(type_name, operand)
        }
        Expression::If {
            test,
            then,
            otherwise,
        } => visitor.condition(test, then, otherwise.as_deref()),
        Expression::Collection(items) => visitor.collection(items),
        Expression::Record(fields) => visitor.record(fields),
        Expression::Bind { name, .. } => Err(ODataError::expression(format!(
            "named argument {name} outside an argument list"
        ))),
    }
}
