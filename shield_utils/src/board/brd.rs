//! Parser for the line oriented board description (`.brd`) format
//!
//! ```text
//! #!/bin/shieldbrd
//! ?board NUCLEO_F429ZI
//! ?formfactor PG_9 PG_14 PF_15 ...
//! ?restricted PA_13 PA_14
//! ?gpio_unsafe PB_3
//! ?uart_reserved 3
//! ?role spi_mosi PA_7 1 0x5
//! ?quit
//! ```
use super::{
    Board,
    BoardBuilder,
    Error,
};
use nom::{
    branch::alt,
    bytes::complete::{
        tag,
        take_till1,
    },
    character::complete::{
        digit1,
        hex_digit1,
        line_ending,
        not_line_ending,
        space0,
        space1,
    },
    combinator::{
        map,
        map_res,
        value,
    },
    multi::many0,
    sequence::{
        preceded,
        terminated,
        tuple,
    },
    IResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive<'a> {
    Board(&'a str),
    FormFactor(Vec<&'a str>),
    Restricted(Vec<&'a str>),
    GpioUnsafe(Vec<&'a str>),
    UartReserved(Vec<u32>),
    Role {
        table: &'a str,
        pin: &'a str,
        instance: u32,
        function: u32,
    },
    Skip,
}

fn shebang(input: &str) -> IResult<&str, &str> {
    terminated(tag("#!/bin/shieldbrd"), line_ending)(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    take_till1(char::is_whitespace)(input)
}

fn tokens(input: &str) -> IResult<&str, Vec<&str>> {
    many0(preceded(space1, token))(input)
}

fn number(input: &str) -> IResult<&str, u32> {
    alt((
        map_res(preceded(tag("0x"), hex_digit1), |s| u32::from_str_radix(s, 16)),
        map_res(digit1, str::parse),
    ))(input)
}

fn end_of_line(input: &str) -> IResult<&str, ()> {
    value((), tuple((space0, line_ending)))(input)
}

fn board(input: &str) -> IResult<&str, Directive> {
    map(
        terminated(preceded(tag("?board"), preceded(space1, token)), end_of_line),
        Directive::Board,
    )(input)
}

fn pin_list<'a>(
    name: &'static str,
    make: fn(Vec<&'a str>) -> Directive<'a>,
) -> impl FnMut(&'a str) -> IResult<&'a str, Directive<'a>> {
    map(terminated(preceded(tag(name), tokens), end_of_line), make)
}

fn uart_reserved(input: &str) -> IResult<&str, Directive> {
    map(
        terminated(
            preceded(tag("?uart_reserved"), many0(preceded(space1, number))),
            end_of_line,
        ),
        Directive::UartReserved,
    )(input)
}

fn role(input: &str) -> IResult<&str, Directive> {
    let (remaining, _) = tag("?role")(input)?;
    let (remaining, table) = preceded(space1, token)(remaining)?;
    let (remaining, pin) = preceded(space1, token)(remaining)?;
    let (remaining, instance) = preceded(space1, number)(remaining)?;
    let (remaining, function) = terminated(preceded(space1, number), end_of_line)(remaining)?;
    Ok((
        remaining,
        Directive::Role {
            table,
            pin,
            instance,
            function,
        },
    ))
}

fn comment(input: &str) -> IResult<&str, Directive> {
    value(
        Directive::Skip,
        alt((
            value((), terminated(preceded(tag("#"), not_line_ending), line_ending)),
            end_of_line,
        )),
    )(input)
}

fn directive(input: &str) -> IResult<&str, Directive> {
    alt((
        board,
        pin_list("?formfactor", Directive::FormFactor),
        pin_list("?restricted", Directive::Restricted),
        pin_list("?gpio_unsafe", Directive::GpioUnsafe),
        uart_reserved,
        role,
        comment,
    ))(input)
}

fn quit(input: &str) -> IResult<&str, &str> {
    terminated(tag("?quit"), space0)(input)
}

fn brd_file(input: &str) -> IResult<&str, Vec<Directive>> {
    let (remaining, _) = shebang(input)?;
    let (remaining, directives) = many0(directive)(remaining)?;
    let (remaining, _) = quit(remaining)?;
    Ok((remaining, directives))
}

/// Parses the contents of a `.brd` file
/// # Errors
/// Returns an error if the text isn't a well formed board description
pub fn parse_board(input: &str) -> Result<Board, Error> {
    let (_, directives) = brd_file(input).map_err(|e| {
        let rest = match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
            nom::Err::Incomplete(_) => "",
        };
        // Report the line the parser stopped on
        let consumed = input.len() - rest.len();
        Error::Parse(input[..consumed].lines().count() + 1)
    })?;
    directives
        .into_iter()
        .fold(BoardBuilder::default(), |b, d| match d {
            Directive::Board(name) => b.name(name),
            Directive::FormFactor(pins) => b.form_factor(pins),
            Directive::Restricted(pins) => b.restricted(pins),
            Directive::GpioUnsafe(pins) => b.gpio_unsafe(pins),
            Directive::UartReserved(instances) => b.uart_reserved(instances),
            Directive::Role {
                table,
                pin,
                instance,
                function,
            } => b.role(table, pin, instance, function),
            Directive::Skip => b,
        })
        .build()
}

impl std::str::FromStr for Board {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_board(s)
    }
}
