mod common;
mod routing;
mod scenarios;
