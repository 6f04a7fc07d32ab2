/*!

This is the long-form manual for `liquid_tally` and `agoratally`.

## How votes are resolved

Every member of the electorate has two independent states, each one set by
the most recent event of its kind:

* the vote state: the last `vote` or `cancel_vote`
* the delegation state: the last `delegation` or `cancel_delegation`

A cancelled state carries no intent. When both states are live (a vote and a
delegation), the most recent one is the present intent of the member. Events
sharing the same timestamp are ordered by their position in the event log.

A member who delegates follows the chain of delegations until a member who
voted directly. Everyone on the chain gets that ballot. The chain gives no
vote at all when:

* it loops back on itself (including a self-delegation)
* it reaches someone who neither voted nor delegated
* it reaches someone outside of the electorate (unless `nonMemberDelegates`
  is `allowPublicDirectVotes`)
* with the default secrecy policy, it reaches a secret ballot, or goes
  through a secret delegation

Take for example the following election:

```text
DELEGATIONS:
david --> user1
user1 --> user2
user2 --> user3 CANCELLED

VOTES:
david ---> NO VOTE -----------------> delegates > user1 > user2 -> foo
user1 ---> foo CANCELLED -----------> delegates > user2 ---------> foo
user2 ---> foo --------------------------------------------------> foo
user3 ---> foo CANCELLED ----------------------------------------> NO VOTE
user4 ---> foo ---> bar OVERWRITTEN -----------------------------> bar
user5 ---> bar --------------------------------------------------> bar
user6 ---> BLANK VOTE -------------------------------------------> BLANK
```

`foo` gets 3 votes (1 direct, 2 delegated), `bar` gets 2 votes, and there is
one dirty vote. The full configuration of this election is in
`tests/delegate_election_count`.

## Counting

Only the `ONE_CHOICE` tally type is supported: each valid mark gives one vote
to the first of its choices in the order of the answers of the question (not
in the order of the ballot). This only matters when `max` is above 1. A mark is dirty when it is blank, or when its number of
choices is outside of the `min` and `max` of the question. Percentages are
computed over the valid marks of the question. The election total includes
the dirty ballots.

## Delegate counts

For each delegate, the number of votes that went through them. With the
default `everyDelegateOnChain` mode, a vote is credited to every delegate of
the chain: in the example above, `user2` gets 2 (from `user1` and `david`),
`user1` gets 1 (from `david`). With `terminalDelegateOnly`, only `user2`
is credited, with 2 votes.

The rank of a delegate is the number of delegates with at least as many
votes.

## Input formats

### `json`

An array of events:

```text
[
  {"type": "delegation", "voter": "david", "delegate": "user1", "timestamp": 1},
  {"type": "vote", "voter": "user2", "answers": [["foo"]], "timestamp": 2},
  {"type": "vote", "voter": "user3", "answers": [["bar"]], "isPublic": false, "timestamp": 3},
  {"type": "cancel_vote", "voter": "user2", "timestamp": 4},
  {"type": "cancel_delegation", "voter": "david", "timestamp": 5}
]
```

### `csv`

```text
voter,type,payload,timestamp,public
david,delegation,user1,1,
user2,vote,foo,2,
user3,vote,bar|first;second,3,false
user2,cancel_vote,,4,
```

Vote payloads separate questions with `|` and the choices of a question
with `;`. The `public` column is optional and defaults to `true`.

## Configuration

`agoratally` reads a JSON configuration file:

```text
{
  "outputSettings": {"electionName": "foo bar", "outputDirectory": null},
  "election": {
    "id": 1,
    "agoraId": 1,
    "questions": [{
      "question": "Do you prefer foo or bar?",
      "tallyType": "ONE_CHOICE",
      "min": 0,
      "max": 1,
      "answers": [{"value": "foo", "details": ""}, {"value": "bar", "details": ""}]
    }]
  },
  "electorate": ["david", "user1"],
  "eventSources": [{"provider": "json", "filePath": "events.json"}],
  "rules": {
    "delegateCountMode": "everyDelegateOnChain",
    "secretVotePolicy": "breaksDelegation",
    "nonMemberDelegates": "reject"
  }
}
```

The `rules` section and all its fields are optional. The paths of the event
sources are relative to the configuration file.

 */
